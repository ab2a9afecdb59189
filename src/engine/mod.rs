pub mod detect;
pub mod normalize;
pub mod notify;
pub mod poller;
pub mod stats;
