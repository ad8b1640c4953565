mod uploads;

pub use uploads::{confirm_upload, create_upload, get_upload, upload_result};
