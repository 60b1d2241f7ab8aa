//! Acknowledgment emails for submitted session requests.
//!
//! Sending is best effort: a missing SMTP configuration or a transport
//! failure never fails the request that triggered the email.

use anyhow::Result;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::EmailConfig;
use crate::db::SessionRequest;

pub struct AckMailer {
    config: EmailConfig,
}

impl AckMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    /// Confirm to the student that their session request reached the teacher.
    pub async fn send_request_acknowledgment(
        &self,
        to_email: &str,
        student_name: &str,
        teacher_name: &str,
        request: &SessionRequest,
    ) -> Result<()> {
        if !self.is_enabled() {
            tracing::debug!(to = %to_email, "Email not configured, skipping acknowledgment");
            return Ok(());
        }

        let subject = format!("Session request sent to {teacher_name}");
        let html_body = render_ack_html(student_name, teacher_name, request);
        let text_body = render_ack_text(student_name, teacher_name, request);

        self.send_email(to_email, &subject, &html_body, &text_body)
            .await
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from: Mailbox = format!("{} <{}>", self.config.from_name, from_address).parse()?;
        let to: Mailbox = to_email.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        let mut mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
            .port(self.config.smtp_port);

        if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer = mailer.credentials(Credentials::new(username.clone(), password.clone()));
        }

        mailer.build().send(email).await?;

        tracing::info!(to = %to_email, subject = %subject, "Email sent");
        Ok(())
    }
}

fn render_ack_html(student_name: &str, teacher_name: &str, request: &SessionRequest) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Session Request Sent</title>
</head>
<body style="font-family: -apple-system, 'Segoe UI', Roboto, Arial, sans-serif; color: #374151;">
    <div style="max-width: 560px; margin: 0 auto; padding: 32px 20px;">
        <h1 style="font-size: 20px;">Your session request is on its way</h1>
        <p>Hi {student_name},</p>
        <p>Your payment went through and your request has been sent to <strong>{teacher_name}</strong>.
           You'll hear back once they accept it.</p>
        <table style="border-collapse: collapse; margin: 20px 0;">
            <tr><td style="padding: 4px 12px 4px 0; color: #6b7280;">Topic</td><td>{title}</td></tr>
            <tr><td style="padding: 4px 12px 4px 0; color: #6b7280;">Date</td><td>{date}</td></tr>
            <tr><td style="padding: 4px 12px 4px 0; color: #6b7280;">Duration</td><td>{duration} minutes</td></tr>
        </table>
        <p style="color: #6b7280; font-size: 13px;">You can track this request from your dashboard under Sessions.</p>
    </div>
</body>
</html>"#,
        student_name = html_escape(student_name),
        teacher_name = html_escape(teacher_name),
        title = html_escape(&request.title),
        date = html_escape(&request.scheduled_date),
        duration = request.duration_minutes,
    )
}

fn render_ack_text(student_name: &str, teacher_name: &str, request: &SessionRequest) -> String {
    format!(
        r#"Your session request is on its way

Hi {student_name},

Your payment went through and your request has been sent to {teacher_name}.
You'll hear back once they accept it.

Topic: {title}
Date: {date}
Duration: {duration} minutes

You can track this request from your dashboard under Sessions."#,
        student_name = student_name,
        teacher_name = teacher_name,
        title = request.title,
        date = request.scheduled_date,
        duration = request.duration_minutes,
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> SessionRequest {
        SessionRequest {
            id: "req-1".to_string(),
            student_id: "student-1".to_string(),
            teacher_id: "teacher-1".to_string(),
            availability_id: None,
            course_id: Some("course-1".to_string()),
            title: "Limits & continuity".to_string(),
            scheduled_date: "2026-09-01".to_string(),
            duration_minutes: 60,
            status: "pending".to_string(),
            payment_status: "completed".to_string(),
            payment_amount: 550,
            created_at: "2026-08-26T10:00:00+00:00".to_string(),
            updated_at: "2026-08-26T10:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn html_escaping() {
        assert_eq!(html_escape("<b>hi</b>"), "&lt;b&gt;hi&lt;/b&gt;");
        assert_eq!(html_escape("Tom & Jerry"), "Tom &amp; Jerry");
    }

    #[test]
    fn ack_text_carries_the_request_details() {
        let text = render_ack_text("Asha", "Ravi", &sample_request());
        assert!(text.contains("Asha"));
        assert!(text.contains("Ravi"));
        assert!(text.contains("Limits & continuity"));
        assert!(text.contains("2026-09-01"));
        assert!(text.contains("60 minutes"));
    }

    #[test]
    fn ack_html_escapes_user_content() {
        let mut request = sample_request();
        request.title = "<script>alert(1)</script>".to_string();
        let html = render_ack_html("Asha", "Ravi", &request);
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
