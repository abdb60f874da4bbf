pub mod event_helpers;
pub mod form_helpers;
pub mod log_helpers;
pub mod mail_helpers;
pub mod sanitization_helpers;
pub mod verification_helpers;
