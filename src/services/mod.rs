pub mod dispatcher;
pub mod recorder;
pub mod secret;
