pub const CODE_CHIP_RATE_HZ:f64 = 1.023e6;
pub const CODE_LENGTH_CHIPS:usize = 4092;
pub const CODE_PERIOD_MS:u32 = 4;

/// Name used for the E1B (data) component in synchronization records
pub const SIGNAL_E1B:&str = "1B";

pub mod signal_modulation;
