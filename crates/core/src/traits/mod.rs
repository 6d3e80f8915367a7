pub mod alerting;
pub mod transport;

pub use alerting::*;
pub use transport::*;
