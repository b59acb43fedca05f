//! Email service for order notifications.
//!
//! Uses SMTP via lettre for delivery with Askama HTML and text templates.
//! Emails are sent after the order is committed; a failed send never
//! affects the order.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;
use crate::models::OrderDetail;

/// One order line, preformatted for templates.
struct EmailLine {
    name: String,
    quantity: i32,
    price: String,
    subtotal: String,
}

/// HTML template for the order confirmation email.
#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    reference: &'a str,
    customer_name: &'a str,
    lines: &'a [EmailLine],
    total: String,
    payment_method: String,
    payment_status: String,
    shipping_address: &'a str,
}

/// Plain text template for the order confirmation email.
#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    reference: &'a str,
    customer_name: &'a str,
    lines: &'a [EmailLine],
    total: String,
    payment_method: String,
    payment_status: String,
    shipping_address: &'a str,
}

/// HTML template for the status update email.
#[derive(Template)]
#[template(path = "email/status_update.html")]
struct StatusUpdateHtml<'a> {
    reference: &'a str,
    customer_name: &'a str,
    status: String,
    payment_status: String,
}

/// Plain text template for the status update email.
#[derive(Template)]
#[template(path = "email/status_update.txt")]
struct StatusUpdateText<'a> {
    reference: &'a str,
    customer_name: &'a str,
    status: String,
    payment_status: String,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// The order has no contact email.
    #[error("order {0} has no contact email")]
    NoRecipient(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    /// Send the order confirmation to the customer.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_order_confirmation(&self, order: &OrderDetail) -> Result<(), EmailError> {
        let to = recipient(order)?;
        let (text, html) = render_confirmation(order)?;
        let subject = format!("Order {} confirmed", order.reference);

        self.send_multipart_email(to, &subject, &text, &html).await
    }

    /// Tell the customer their order moved to a new status.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_status_update(&self, order: &OrderDetail) -> Result<(), EmailError> {
        let to = recipient(order)?;
        let (text, html) = render_status_update(order)?;
        let subject = format!("Order {} is {}", order.reference, order.order.status);

        self.send_multipart_email(to, &subject, &text, &html).await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
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

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

fn recipient(order: &OrderDetail) -> Result<&str, EmailError> {
    order
        .customer_email
        .as_ref()
        .map(|e| e.as_str())
        .ok_or_else(|| EmailError::NoRecipient(order.reference.clone()))
}

fn greeting_name(order: &OrderDetail) -> &str {
    order.customer_name.as_deref().unwrap_or("there")
}

fn email_lines(order: &OrderDetail) -> Vec<EmailLine> {
    order
        .items
        .iter()
        .map(|line| EmailLine {
            name: line.product_name.clone(),
            quantity: line.quantity,
            price: line.price.to_string(),
            subtotal: line
                .price
                .times(line.quantity)
                .map_or_else(|_| "-".to_owned(), |m| m.to_string()),
        })
        .collect()
}

/// Render the (text, html) bodies of the confirmation email.
fn render_confirmation(order: &OrderDetail) -> Result<(String, String), EmailError> {
    let lines = email_lines(order);
    let reference = order.reference.as_str();
    let customer_name = greeting_name(order);
    let total = order.order.total_amount.to_string();
    let payment_method = order.order.payment_method.to_string();
    let payment_status = order.order.payment_status.to_string();
    let shipping_address = order.order.shipping_address.as_str();

    let text = OrderConfirmationText {
        reference,
        customer_name,
        lines: &lines,
        total: total.clone(),
        payment_method: payment_method.clone(),
        payment_status: payment_status.clone(),
        shipping_address,
    }
    .render()?;
    let html = OrderConfirmationHtml {
        reference,
        customer_name,
        lines: &lines,
        total,
        payment_method,
        payment_status,
        shipping_address,
    }
    .render()?;

    Ok((text, html))
}

/// Render the (text, html) bodies of the status update email.
fn render_status_update(order: &OrderDetail) -> Result<(String, String), EmailError> {
    let reference = order.reference.as_str();
    let customer_name = greeting_name(order);
    let status = order.order.status.to_string();
    let payment_status = order.order.payment_status.to_string();

    let text = StatusUpdateText {
        reference,
        customer_name,
        status: status.clone(),
        payment_status: payment_status.clone(),
    }
    .render()?;
    let html = StatusUpdateHtml {
        reference,
        customer_name,
        status,
        payment_status,
    }
    .render()?;

    Ok((text, html))
}
