use crate::config::Config;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::sync::Arc;
use tera::{Context, Tera};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("Failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("SMTP transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),
    #[error("SMTP is not configured: {0}")]
    NotConfigured(String),
}

/// Outbound mail seam. Handlers depend on this trait so tests and
/// SMTP-less deployments can swap the transport.
pub trait Mailer: Send + Sync {
    fn send_verification(&self, to: &str, verification_link: &str) -> Result<(), MailError>;
    fn send_welcome(&self, to: &str) -> Result<(), MailError>;
}

pub type SharedMailer = Arc<dyn Mailer>;

pub struct SmtpMailer {
    transport: SmtpTransport,
    from: String,
    templates: Tera,
}

impl SmtpMailer {
    pub fn from_config(config: &Config, templates: Tera) -> Result<Self, MailError> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| MailError::NotConfigured("SMTP_HOST is not set".to_string()))?;
        let mut builder = SmtpTransport::relay(host)?.port(config.smtp_port);
        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        Ok(SmtpMailer {
            transport: builder.build(),
            from: config.mail_from.clone(),
            templates,
        })
    }

    fn send_html(&self, to: &str, subject: &str, html: String) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)?;
        self.transport.send(&message)?;
        Ok(())
    }
}

impl Mailer for SmtpMailer {
    fn send_verification(&self, to: &str, verification_link: &str) -> Result<(), MailError> {
        let mut context = Context::new();
        context.insert("verification_link", verification_link);
        let html = self.templates.render("emails/verification.html", &context)?;
        self.send_html(to, "Please confirm your email address", html)
    }

    fn send_welcome(&self, to: &str) -> Result<(), MailError> {
        let context = Context::new();
        let html = self.templates.render("emails/welcome.html", &context)?;
        self.send_html(to, "Welcome aboard", html)
    }
}

/// Fallback for deployments without SMTP: writes the mail to the server log
/// so the verification link stays reachable during development.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send_verification(&self, to: &str, verification_link: &str) -> Result<(), MailError> {
        log::info!("Verification mail for {}: {}", to, verification_link);
        Ok(())
    }

    fn send_welcome(&self, to: &str) -> Result<(), MailError> {
        log::info!("Welcome mail for {}", to);
        Ok(())
    }
}

#[cfg(test)]
pub mod test_support {
    use super::{MailError, Mailer};
    use std::sync::Mutex;

    /// Records every send; optionally fails them all.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<(String, String)>>,
        pub fail: bool,
    }

    impl Mailer for RecordingMailer {
        fn send_verification(&self, to: &str, verification_link: &str) -> Result<(), MailError> {
            if self.fail {
                return Err(MailError::NotConfigured("deliberately broken".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), verification_link.to_string()));
            Ok(())
        }

        fn send_welcome(&self, to: &str) -> Result<(), MailError> {
            if self.fail {
                return Err(MailError::NotConfigured("deliberately broken".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), "welcome".to_string()));
            Ok(())
        }
    }
}
