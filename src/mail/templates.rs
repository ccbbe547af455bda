use serde::Serialize;
use tera::{Context, Tera};

use crate::error::AppError;

/// A rendered email, ready to hand to a `Mailer`.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

const TEMPLATES: &[(&str, &str)] = &[
    (
        "verify_otp",
        "Hi {{ name }},\n\n\
         Welcome to InternConnect! Your verification code is:\n\n\
         {{ code }}\n\n\
         It expires in {{ ttl_minutes }} minutes. If you did not sign up, ignore this email.\n",
    ),
    (
        "reset_otp",
        "Hi,\n\n\
         We received a request to reset your InternConnect password. Your code is:\n\n\
         {{ code }}\n\n\
         It expires in {{ ttl_minutes }} minutes. If you did not ask for this, you can ignore this email.\n",
    ),
    (
        "application_status",
        "Hi {{ name }},\n\n\
         Your application for {{ job_title }} at {{ company_name }} is now: {{ status }}.\n\n\
         Log in to InternConnect to see the details.\n",
    ),
];

/// Email bodies rendered from embedded Tera templates.
pub struct EmailTemplates {
    tera: Tera,
}

#[derive(Serialize)]
struct OtpContext<'a> {
    name: &'a str,
    code: &'a str,
    ttl_minutes: i64,
}

#[derive(Serialize)]
struct StatusContext<'a> {
    name: &'a str,
    job_title: &'a str,
    company_name: &'a str,
    status: &'a str,
}

impl EmailTemplates {
    pub fn new() -> Result<Self, AppError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.to_vec())
            .map_err(|e| AppError::Internal(format!("Invalid email template: {e}")))?;
        Ok(Self { tera })
    }

    fn render(&self, template: &str, context: &impl Serialize) -> Result<String, AppError> {
        let context = Context::from_serialize(context)
            .map_err(|e| AppError::Internal(format!("Invalid template context: {e}")))?;
        self.tera
            .render(template, &context)
            .map_err(|e| AppError::Internal(format!("Failed to render '{template}': {e}")))
    }

    pub fn verification(
        &self,
        to: &str,
        name: &str,
        code: &str,
        ttl_minutes: i64,
    ) -> Result<EmailMessage, AppError> {
        Ok(EmailMessage {
            to: to.to_string(),
            subject: "Verify your InternConnect account".to_string(),
            body: self.render(
                "verify_otp",
                &OtpContext {
                    name,
                    code,
                    ttl_minutes,
                },
            )?,
        })
    }

    pub fn password_reset(
        &self,
        to: &str,
        code: &str,
        ttl_minutes: i64,
    ) -> Result<EmailMessage, AppError> {
        Ok(EmailMessage {
            to: to.to_string(),
            subject: "Reset your InternConnect password".to_string(),
            body: self.render(
                "reset_otp",
                &OtpContext {
                    name: "",
                    code,
                    ttl_minutes,
                },
            )?,
        })
    }

    pub fn application_status(
        &self,
        to: &str,
        name: &str,
        job_title: &str,
        company_name: &str,
        status: &str,
    ) -> Result<EmailMessage, AppError> {
        Ok(EmailMessage {
            to: to.to_string(),
            subject: format!("Update on your application for {job_title}"),
            body: self.render(
                "application_status",
                &StatusContext {
                    name,
                    job_title,
                    company_name,
                    status,
                },
            )?,
        })
    }
}
