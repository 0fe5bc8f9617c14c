pub mod file;
pub mod user;

pub use file::{FileSystemEntry, StorageUsage, UploadedFile};
pub use user::{ProfileUpdate, User, UserProfile};
