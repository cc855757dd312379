pub mod adapter;
pub mod database;
pub mod fcm;
pub mod health;
pub mod mailgun;
pub mod memory;
pub mod profile_store;
pub mod redis;
pub mod smtp;
pub mod template;
pub mod twilio;
