pub mod todo_repository;
pub mod user_device_repository;

pub use todo_repository::TodoRepository;
pub use user_device_repository::UserDeviceRepository;
