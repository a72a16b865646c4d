//! HTTP surface. Handlers translate between JSON bodies and the workflow
//! service; every [`WorkflowError`] variant maps onto exactly one status
//! code through [`ApiError`].

use rocket::data::ToByteUnit;
use rocket::serde::json::Json;

use crate::error::WorkflowError;
use crate::models::{AuditLog, Document, Signer};
use crate::schema::SignatureType;
use crate::signing::{SignaturePayload, SignerOutcome, SignerRef};

/// Request metadata recorded in the audit trail.
pub struct ClientMeta {
    pub ip: std::net::IpAddr,
    pub user_agent: String,
}

#[rocket::async_trait]
impl<'r> rocket::request::FromRequest<'r> for ClientMeta {
    type Error = ();

    async fn from_request(
        request: &'r rocket::Request<'_>,
    ) -> rocket::request::Outcome<Self, ()> {
        let addr = match rocket_client_addr::ClientRealAddr::from_request(request).await {
            rocket::outcome::Outcome::Success(addr) => addr,
            _ => {
                return rocket::outcome::Outcome::Error((
                    rocket::http::Status::InternalServerError,
                    (),
                ))
            }
        };
        let ip = match addr.get_ipv4() {
            Some(v4) => std::net::IpAddr::V4(v4),
            None => addr.ip,
        };
        let user_agent = request
            .headers()
            .get_one("User-Agent")
            .unwrap_or("unknown")
            .to_string();

        rocket::request::Outcome::Success(ClientMeta { ip, user_agent })
    }
}

/// Authenticated document owner, from an `Authorization: Bearer` session
/// token (see [`crate::auth`]).
pub struct Owner {
    pub id: uuid::Uuid,
}

#[rocket::async_trait]
impl<'r> rocket::request::FromRequest<'r> for Owner {
    type Error = ();

    async fn from_request(
        request: &'r rocket::Request<'_>,
    ) -> rocket::request::Outcome<Self, ()> {
        let config = match request.rocket().state::<crate::Config>() {
            Some(c) => c,
            None => {
                return rocket::outcome::Outcome::Error((
                    rocket::http::Status::InternalServerError,
                    (),
                ))
            }
        };

        let token = match request
            .headers()
            .get_one("Authorization")
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            Some(t) => t,
            None => {
                return rocket::outcome::Outcome::Error((rocket::http::Status::Unauthorized, ()))
            }
        };

        match crate::auth::verify_session(token, &config.session_key) {
            Some(id) => rocket::outcome::Outcome::Success(Owner { id }),
            None => rocket::outcome::Outcome::Error((rocket::http::Status::Unauthorized, ())),
        }
    }
}

pub struct ApiError(pub WorkflowError);

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        Self(err)
    }
}

impl<'r> rocket::response::Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r rocket::Request<'_>) -> rocket::response::Result<'static> {
        let mut body = serde_json::json!({ "message": self.0.to_string() });
        let status = match &self.0 {
            WorkflowError::InvalidPayload(_) | WorkflowError::ReasonTooShort { .. } => {
                rocket::http::Status::BadRequest
            }
            WorkflowError::InvalidEmails(emails) => {
                body["invalidEmails"] = serde_json::json!(emails);
                rocket::http::Status::BadRequest
            }
            WorkflowError::DuplicateSigners(emails) => {
                body["duplicateEmails"] = serde_json::json!(emails);
                rocket::http::Status::BadRequest
            }
            WorkflowError::SignerMismatch => rocket::http::Status::BadRequest,
            WorkflowError::PermissionDenied => rocket::http::Status::Forbidden,
            WorkflowError::DocumentNotFound
            | WorkflowError::SignerNotFound
            | WorkflowError::TokenInvalid => rocket::http::Status::NotFound,
            WorkflowError::AlreadyResponded { status } => {
                body["currentStatus"] = serde_json::json!(status.to_string());
                rocket::http::Status::Conflict
            }
            WorkflowError::DocumentClosed { status } => {
                body["currentStatus"] = serde_json::json!(status.to_string());
                rocket::http::Status::Conflict
            }
            WorkflowError::Store(err) => {
                error!("Store error serving {}: {}", request.uri(), err);
                rocket::http::Status::InternalServerError
            }
            WorkflowError::Storage(err) => {
                error!("Storage error serving {}: {}", request.uri(), err);
                rocket::http::Status::InternalServerError
            }
        };

        rocket::response::Response::build_from(Json(body).respond_to(request)?)
            .status(status)
            .ok()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    #[serde(flatten)]
    document: Document,
    original_download_url: String,
    signed_download_url: Option<String>,
}

impl DocumentView {
    fn new(document: Document, config: &crate::Config) -> Self {
        Self {
            original_download_url: download_url(&document.original_url, &config.files_key),
            signed_download_url: document
                .signed_url
                .as_deref()
                .map(|url| download_url(url, &config.files_key)),
            document,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDetailView {
    #[serde(flatten)]
    document: DocumentView,
    signers: Vec<Signer>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningPageView {
    document: DocumentView,
    signer: Signer,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerOutcomeView {
    document: DocumentView,
    signer: Signer,
}

impl SignerOutcomeView {
    fn new(outcome: SignerOutcome, config: &crate::Config) -> Self {
        Self {
            document: DocumentView::new(outcome.document, config),
            signer: outcome.signer,
        }
    }
}

fn download_url(url: &str, key: &[u8]) -> String {
    match url.strip_prefix("/files/") {
        Some(name) => crate::files::signed_path(name, key),
        None => url.to_string(),
    }
}

#[derive(Deserialize)]
pub struct AddSignersRequest {
    pub emails: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRequest {
    #[serde(rename = "type")]
    pub sig_type: SignatureType,
    #[serde(alias = "signatureImage", alias = "imageData")]
    pub value: String,
    pub x: f64,
    pub y: f64,
    pub page: i32,
}

impl From<SignatureRequest> for SignaturePayload {
    fn from(req: SignatureRequest) -> Self {
        Self {
            sig_type: req.sig_type,
            value: req.value,
            x: req.x,
            y: req.y,
            page: req.page,
        }
    }
}

#[derive(Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

#[post("/documents", data = "<data>")]
pub async fn upload_document(
    data: rocket::Data<'_>,
    owner: Owner,
    client: ClientMeta,
    service: &rocket::State<crate::AppService>,
    config: &rocket::State<crate::Config>,
) -> Result<rocket::response::status::Created<Json<DocumentView>>, ApiError> {
    let bytes = data
        .open(32.mebibytes())
        .into_bytes()
        .await
        .map_err(|e| WorkflowError::InvalidPayload(e.to_string()))?;
    if !bytes.is_complete() {
        return Err(WorkflowError::InvalidPayload("document too large".to_string()).into());
    }

    let document = service
        .upload_document(owner.id, bytes.into_inner(), &client)
        .await?;
    let location = format!("/documents/{}", document.id);
    Ok(rocket::response::status::Created::new(location)
        .body(Json(DocumentView::new(document, config))))
}

#[get("/documents/my")]
pub fn my_documents(
    owner: Owner,
    service: &rocket::State<crate::AppService>,
    config: &rocket::State<crate::Config>,
) -> Result<Json<Vec<DocumentView>>, ApiError> {
    let documents = service.documents_for_owner(owner.id)?;
    Ok(Json(
        documents
            .into_iter()
            .map(|d| DocumentView::new(d, config))
            .collect(),
    ))
}

#[get("/documents/<id>")]
pub fn document(
    id: uuid::Uuid,
    owner: Owner,
    service: &rocket::State<crate::AppService>,
    config: &rocket::State<crate::Config>,
) -> Result<Json<DocumentDetailView>, ApiError> {
    let (document, signers) = service.document_for_owner(owner.id, id)?;
    Ok(Json(DocumentDetailView {
        document: DocumentView::new(document, config),
        signers,
    }))
}

#[get("/documents/<id>/audit")]
pub fn document_audit(
    id: uuid::Uuid,
    owner: Owner,
    service: &rocket::State<crate::AppService>,
) -> Result<Json<Vec<AuditLog>>, ApiError> {
    Ok(Json(service.audit_trail(owner.id, id)?))
}

#[post("/documents/<id>/signers", data = "<body>")]
pub fn add_signers(
    id: uuid::Uuid,
    body: Json<AddSignersRequest>,
    owner: Owner,
    client: ClientMeta,
    service: &rocket::State<crate::AppService>,
) -> Result<Json<Vec<Signer>>, ApiError> {
    Ok(Json(service.add_signers(
        owner.id,
        id,
        &body.into_inner().emails,
        &client,
    )?))
}

#[get("/sign/<token>")]
pub fn signing_page(
    token: &str,
    service: &rocket::State<crate::AppService>,
    config: &rocket::State<crate::Config>,
) -> Result<Json<SigningPageView>, ApiError> {
    let (document, signer) = service.verify_token(token)?;
    Ok(Json(SigningPageView {
        document: DocumentView::new(document, config),
        signer,
    }))
}

#[post("/sign/<token>/accept", data = "<body>")]
pub async fn token_accept(
    token: &str,
    body: Json<SignatureRequest>,
    client: ClientMeta,
    service: &rocket::State<crate::AppService>,
    config: &rocket::State<crate::Config>,
) -> Result<Json<SignerOutcomeView>, ApiError> {
    let outcome = service
        .accept_signing(SignerRef::Token(token), body.into_inner().into(), &client)
        .await?;
    Ok(Json(SignerOutcomeView::new(outcome, config)))
}

#[post("/sign/<token>/reject", data = "<body>")]
pub async fn token_reject(
    token: &str,
    body: Option<Json<RejectRequest>>,
    client: ClientMeta,
    service: &rocket::State<crate::AppService>,
    config: &rocket::State<crate::Config>,
) -> Result<Json<SignerOutcomeView>, ApiError> {
    let reason = body.and_then(|b| b.into_inner().reason);
    let outcome = service
        .reject_signing(SignerRef::Token(token), reason.as_deref(), &client)
        .await?;
    Ok(Json(SignerOutcomeView::new(outcome, config)))
}

#[post("/documents/<id>/signers/<signer_id>/accept", data = "<body>")]
pub async fn owner_accept(
    id: uuid::Uuid,
    signer_id: uuid::Uuid,
    body: Json<SignatureRequest>,
    owner: Owner,
    client: ClientMeta,
    service: &rocket::State<crate::AppService>,
    config: &rocket::State<crate::Config>,
) -> Result<Json<SignerOutcomeView>, ApiError> {
    let outcome = service
        .accept_signing(
            SignerRef::Owner {
                requester: owner.id,
                document_id: id,
                signer_id,
            },
            body.into_inner().into(),
            &client,
        )
        .await?;
    Ok(Json(SignerOutcomeView::new(outcome, config)))
}

#[post("/documents/<id>/signers/<signer_id>/reject", data = "<body>")]
pub async fn owner_reject(
    id: uuid::Uuid,
    signer_id: uuid::Uuid,
    body: Json<RejectRequest>,
    owner: Owner,
    client: ClientMeta,
    service: &rocket::State<crate::AppService>,
    config: &rocket::State<crate::Config>,
) -> Result<Json<SignerOutcomeView>, ApiError> {
    let outcome = service
        .reject_signing(
            SignerRef::Owner {
                requester: owner.id,
                document_id: id,
                signer_id,
            },
            body.into_inner().reason.as_deref(),
            &client,
        )
        .await?;
    Ok(Json(SignerOutcomeView::new(outcome, config)))
}
