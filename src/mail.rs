//! Mail delivery. Notifications are a side effect of the workflow, never a
//! correctness dependency: every send logs its failure and returns nothing
//! to the caller.

lazy_static::lazy_static! {
    static ref TEMPLATES: tera::Tera = {
        let mut tera = match tera::Tera::new("templates_email/**/*") {
            Ok(t) => t,
            Err(e) => {
                println!("Parsing error(s): {}", e);
                ::std::process::exit(1);
            }
        };
        tera.autoescape_on(vec![".html"]);
        tera
    };
}

#[derive(thiserror::Error, Debug)]
pub enum MailError {
    #[error("unable to render email template: {0}")]
    Template(#[from] tera::Error),
    #[error("unable to build email: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("unable to parse address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("unable to send email: {0}")]
    Transport(String),
}

#[rocket::async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, msg: lettre::Message) -> Result<(), MailError>;
}

#[rocket::async_trait]
impl EmailTransport for lettre::transport::stub::AsyncStubTransport {
    async fn send(&self, msg: lettre::Message) -> Result<(), MailError> {
        lettre::AsyncTransport::send(self, msg)
            .await
            .map_err(|err| MailError::Transport(err.to_string()))
    }
}

#[rocket::async_trait]
impl EmailTransport for lettre::transport::file::AsyncFileTransport<lettre::Tokio1Executor> {
    async fn send(&self, msg: lettre::Message) -> Result<(), MailError> {
        lettre::AsyncTransport::send(self, msg)
            .await
            .map(|_| ())
            .map_err(|err| MailError::Transport(err.to_string()))
    }
}

#[rocket::async_trait]
impl EmailTransport
    for lettre::transport::smtp::AsyncSmtpTransport<lettre::Tokio1Executor>
{
    async fn send(&self, msg: lettre::Message) -> Result<(), MailError> {
        lettre::AsyncTransport::send(self, msg)
            .await
            .map(|_| ())
            .map_err(|err| MailError::Transport(err.to_string()))
    }
}

pub type EmailTransportType = Box<dyn EmailTransport>;

pub fn smtp_transport(
    conf: &crate::SMTPConfig,
) -> lettre::transport::smtp::AsyncSmtpTransport<lettre::Tokio1Executor> {
    let mut builder =
        lettre::transport::smtp::AsyncSmtpTransport::<lettre::Tokio1Executor>::builder_dangerous(
            &conf.server,
        )
        .port(conf.port);
    if conf.use_tls {
        builder = builder.tls(lettre::transport::smtp::client::Tls::Required(
            lettre::transport::smtp::client::TlsParameters::new(conf.server.clone())
                .expect("Unable to setup SMTP TLS parameters"),
        ));
    }
    if let Some(auth) = &conf.auth {
        builder = builder.credentials(lettre::transport::smtp::authentication::Credentials::new(
            auth.username.clone(),
            auth.password.clone(),
        ));
    }
    builder.build()
}

#[derive(Serialize)]
struct SignatureRequestContext {
    signing_url: String,
}

#[derive(Serialize)]
struct DocumentSignedContext {
    document_url: String,
}

pub struct Mailer {
    transport: std::sync::Arc<EmailTransportType>,
    from: lettre::message::Mailbox,
    external_uri: String,
}

impl Mailer {
    pub fn new(transport: EmailTransportType, from: &str, external_uri: String) -> Self {
        Self {
            transport: std::sync::Arc::new(transport),
            from: from.parse().expect("Unable to parse mail from address"),
            external_uri,
        }
    }

    pub fn signing_url(&self, token: &str) -> String {
        format!("{}/sign/{}", self.external_uri, token)
    }

    /// Invitation mail for a freshly added signer. Fire-and-forget.
    pub async fn send_signature_request(&self, to: &str, token: &str) {
        let res = self
            .build_and_send(
                to,
                "Your signature is requested",
                "sig_request",
                &SignatureRequestContext {
                    signing_url: self.signing_url(token),
                },
            )
            .await;
        if let Err(err) = res {
            warn!("Failed to send signature request to {}: {}", to, err);
        }
    }

    /// Completion mail. Links back to the recipient's own signing page,
    /// which hands out a fresh download key; file keys expire too quickly
    /// to be mailed directly.
    pub async fn send_document_signed(&self, to: &str, token: &str) {
        let res = self
            .build_and_send(
                to,
                "Your signed document",
                "doc_signed",
                &DocumentSignedContext {
                    document_url: self.signing_url(token),
                },
            )
            .await;
        if let Err(err) = res {
            warn!("Failed to send signed document mail to {}: {}", to, err);
        }
    }

    async fn build_and_send<C: serde::Serialize>(
        &self,
        to: &str,
        subject: &str,
        template: &str,
        context: &C,
    ) -> Result<(), MailError> {
        let context = tera::Context::from_serialize(context)?;
        let html = TEMPLATES.render(&format!("{}.html", template), &context)?;
        let txt = TEMPLATES.render(&format!("{}.txt", template), &context)?;

        let message = lettre::message::Message::builder()
            .from(self.from.clone())
            .to(lettre::message::Mailbox {
                name: None,
                email: to.parse()?,
            })
            .subject(subject)
            .multipart(lettre::message::MultiPart::alternative_plain_html(
                txt, html,
            ))?;

        self.transport.send(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mailer() -> Mailer {
        Mailer::new(
            Box::new(lettre::transport::stub::AsyncStubTransport::new_ok()),
            "DocSign <no-reply@docsign.test>",
            "https://docsign.test".to_string(),
        )
    }

    #[test]
    fn signing_urls_embed_the_token() {
        assert_eq!(
            mailer().signing_url("tok123"),
            "https://docsign.test/sign/tok123"
        );
    }

    #[tokio::test]
    async fn templates_render_and_send() {
        // Panics inside build_and_send would surface here; a clean return
        // means both templates rendered and the stub accepted the message.
        mailer()
            .send_signature_request("signer@example.com", "tok123")
            .await;
        mailer()
            .send_document_signed("signer@example.com", "tok123")
            .await;
    }
}
