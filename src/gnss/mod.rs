/// Signal definitions for the Galileo E1 open service
pub mod galileo_e1;

/// Detection of a ranging code and estimation of its code phase and Doppler ahead of tracking
pub mod acquisition;

/// Records and events handed from an acquisition channel to the rest of the receiver
pub mod synchro;
