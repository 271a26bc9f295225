pub mod credentials;
pub mod dispatch;
pub mod fcm;
pub mod init;
pub mod rest_store;
pub mod store;
