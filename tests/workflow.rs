//! End-to-end workflow tests over the in-memory store and storage, with PDF
//! stamping enabled: upload, invite, sign or reject, and download.

use std::sync::Arc;

use lopdf::dictionary;

use docsign::mail::Mailer;
use docsign::schema::{DocumentStatus, SignatureType, SignerStatus};
use docsign::signing::{SignaturePayload, SignerRef, SigningService};
use docsign::storage::{MemoryStorage, ObjectStorage};
use docsign::store::memory::MemoryStore;
use docsign::store::DocumentStore;
use docsign::views::ClientMeta;

fn build() -> (
    SigningService<MemoryStore>,
    Arc<MemoryStore>,
    Arc<MemoryStorage>,
) {
    let store = Arc::new(MemoryStore::default());
    let storage = Arc::new(MemoryStorage::default());
    let mailer = Arc::new(Mailer::new(
        Box::new(lettre::transport::stub::AsyncStubTransport::new_ok()),
        "DocSign <no-reply@docsign.test>",
        "https://docsign.test".to_string(),
    ));
    let service = SigningService::new(
        store.clone(),
        storage.clone() as Arc<dyn ObjectStorage>,
        mailer,
        true,
    );
    (service, store, storage)
}

fn client() -> ClientMeta {
    ClientMeta {
        ip: "192.0.2.7".parse().unwrap(),
        user_agent: "workflow-test".to_string(),
    }
}

fn minimal_pdf() -> Vec<u8> {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content = lopdf::content::Content {
        operations: vec![lopdf::content::Operation::new(
            "re",
            vec![10.into(), 10.into(), 100.into(), 100.into()],
        )],
    };
    let content_id = doc.add_object(lopdf::Stream::new(
        dictionary! {},
        content.encode().unwrap(),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
    };
    doc.objects.insert(pages_id, lopdf::Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

fn drawn_png_data_url() -> String {
    let mut png = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png, 2, 2);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&[0xff; 16]).unwrap();
    }
    format!("data:image/png;base64,{}", base64::encode(&png))
}

fn typed_payload(name: &str) -> SignaturePayload {
    SignaturePayload {
        sig_type: SignatureType::Typed,
        value: name.to_string(),
        x: 60.0,
        y: 120.0,
        page: 1,
    }
}

fn page_operators(pdf: &[u8]) -> Vec<String> {
    let doc = lopdf::Document::load_mem(pdf).unwrap();
    let page_id = *doc.get_pages().get(&1).unwrap();
    doc.get_and_decode_page_content(page_id)
        .unwrap()
        .operations
        .iter()
        .map(|op| op.operator.clone())
        .collect()
}

#[tokio::test]
async fn full_signing_round_produces_a_stamped_document() {
    let (service, store, storage) = build();
    let owner = uuid::Uuid::new_v4();

    let document = service
        .upload_document(owner, minimal_pdf(), &client())
        .await
        .unwrap();
    assert_eq!(document.status, DocumentStatus::Pending);
    assert!(storage.fetch(&document.original_url).await.is_ok());

    let signers = service
        .add_signers(
            owner,
            document.id,
            &["alice@example.com".to_string(), "bob@example.com".to_string()],
            &client(),
        )
        .unwrap();
    assert_eq!(signers.len(), 2);

    // Alice types her name.
    let outcome = service
        .accept_signing(
            SignerRef::Token(&signers[0].token),
            typed_payload("Alice Example"),
            &client(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.document.status, DocumentStatus::PartiallySigned);
    let signed_url = outcome.document.signed_url.clone().unwrap();
    assert!(page_operators(&storage.fetch(&signed_url).await.unwrap()).contains(&"Tj".to_string()));

    // Bob draws his signature; the stamp lands on the already-stamped copy.
    let outcome = service
        .accept_signing(
            SignerRef::Token(&signers[1].token),
            SignaturePayload {
                sig_type: SignatureType::Drawn,
                value: drawn_png_data_url(),
                x: 300.0,
                y: 120.0,
                page: 1,
            },
            &client(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.document.status, DocumentStatus::Signed);

    let final_pdf = storage
        .fetch(outcome.document.signed_url.as_deref().unwrap())
        .await
        .unwrap();
    let ops = page_operators(&final_pdf);
    assert!(ops.contains(&"Tj".to_string()));
    assert!(ops.contains(&"Do".to_string()));

    let stored = store.document(document.id).unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::Signed);
    assert!(stored.signed_url.is_some());
}

#[tokio::test]
async fn a_rejection_closes_the_document_for_everyone() {
    let (service, store, _) = build();
    let owner = uuid::Uuid::new_v4();

    let document = service
        .upload_document(owner, minimal_pdf(), &client())
        .await
        .unwrap();
    let signers = service
        .add_signers(
            owner,
            document.id,
            &["alice@example.com".to_string(), "bob@example.com".to_string()],
            &client(),
        )
        .unwrap();

    let outcome = service
        .reject_signing(
            SignerRef::Token(&signers[0].token),
            Some("Numbers in section 2 are wrong"),
            &client(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.document.status, DocumentStatus::Rejected);
    assert_eq!(
        outcome.signer.rejection_reason.as_deref(),
        Some("Numbers in section 2 are wrong")
    );

    // Bob can no longer respond, and no further signers can be invited.
    let res = service
        .accept_signing(
            SignerRef::Token(&signers[1].token),
            typed_payload("Bob Example"),
            &client(),
        )
        .await;
    assert!(res.is_err());
    assert!(service
        .add_signers(
            owner,
            document.id,
            &["carol@example.com".to_string()],
            &client()
        )
        .is_err());

    let trail = store.audit_for_document(document.id).unwrap();
    let actions = trail.iter().map(|e| e.action.as_str()).collect::<Vec<_>>();
    assert_eq!(
        actions,
        vec![
            "DOCUMENT_UPLOADED",
            "SIGNERS_ADDED (2)",
            "SIGNER_REJECTED (alice@example.com)"
        ]
    );
    assert!(trail.iter().all(|e| e.ip_address == "192.0.2.7"));
}

#[tokio::test]
async fn late_invitations_reopen_a_completed_document() {
    let (service, store, _) = build();
    let owner = uuid::Uuid::new_v4();

    let document = service
        .upload_document(owner, minimal_pdf(), &client())
        .await
        .unwrap();
    let signers = service
        .add_signers(
            owner,
            document.id,
            &["alice@example.com".to_string()],
            &client(),
        )
        .unwrap();
    service
        .accept_signing(
            SignerRef::Token(&signers[0].token),
            typed_payload("Alice Example"),
            &client(),
        )
        .await
        .unwrap();
    assert_eq!(
        store.document(document.id).unwrap().unwrap().status,
        DocumentStatus::Signed
    );

    service
        .add_signers(
            owner,
            document.id,
            &["bob@example.com".to_string()],
            &client(),
        )
        .unwrap();
    assert_eq!(
        store.document(document.id).unwrap().unwrap().status,
        DocumentStatus::PartiallySigned
    );
}

#[tokio::test]
async fn owners_can_record_responses_on_behalf_of_signers() {
    let (service, store, _) = build();
    let owner = uuid::Uuid::new_v4();

    let document = service
        .upload_document(owner, minimal_pdf(), &client())
        .await
        .unwrap();
    let signers = service
        .add_signers(
            owner,
            document.id,
            &["alice@example.com".to_string(), "bob@example.com".to_string()],
            &client(),
        )
        .unwrap();

    let outcome = service
        .accept_signing(
            SignerRef::Owner {
                requester: owner,
                document_id: document.id,
                signer_id: signers[0].id,
            },
            typed_payload("Alice Example"),
            &client(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.signer.status, SignerStatus::Signed);
    assert_eq!(store.signatures_for_signer(signers[0].id).len(), 1);

    // The owner path demands a real reason.
    let res = service
        .reject_signing(
            SignerRef::Owner {
                requester: owner,
                document_id: document.id,
                signer_id: signers[1].id,
            },
            Some("a"),
            &client(),
        )
        .await;
    assert!(res.is_err());

    let outcome = service
        .reject_signing(
            SignerRef::Owner {
                requester: owner,
                document_id: document.id,
                signer_id: signers[1].id,
            },
            Some("Signer asked to be withdrawn"),
            &client(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.document.status, DocumentStatus::Rejected);
}

#[tokio::test]
async fn token_pages_expose_the_document_without_a_session() {
    let (service, _, _) = build();
    let owner = uuid::Uuid::new_v4();

    let document = service
        .upload_document(owner, minimal_pdf(), &client())
        .await
        .unwrap();
    let signers = service
        .add_signers(
            owner,
            document.id,
            &["alice@example.com".to_string()],
            &client(),
        )
        .unwrap();

    let (page_doc, page_signer) = service.verify_token(&signers[0].token).unwrap();
    assert_eq!(page_doc.id, document.id);
    assert_eq!(page_signer.email, "alice@example.com");
    assert_eq!(page_signer.status, SignerStatus::Pending);
}
