pub mod lifecycle_test;
pub mod messaging_test;
pub mod session_sync_test;
