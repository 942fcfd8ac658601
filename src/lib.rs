pub mod app;
pub mod clock;
pub mod composer;
pub mod inject;
pub mod model;
pub mod scheduler;
pub mod sim;
pub mod sink;
pub mod timing;
pub mod window;
