pub mod devices;
pub mod dispatcher;
pub mod router;
