mod archival_gateway;

pub use archival_gateway::*;
