pub mod event;
pub mod history;
pub mod order;
pub mod profile;
pub mod stats;
