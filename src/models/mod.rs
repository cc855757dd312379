pub mod audit;
pub mod channel;
pub mod dispatch;
pub mod event;
pub mod fcm;
pub mod health;
pub mod mailgun;
pub mod recipient;
pub mod request;
pub mod response;
pub mod retry;
pub mod secret;
pub mod status;
pub mod template;
pub mod twilio;
pub mod validation;
