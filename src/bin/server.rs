#[macro_use]
extern crate log;

#[tokio::main]
async fn main() -> Result<(), rocket::Error> {
    pretty_env_logger::init();

    let app = docsign::setup().await;

    info!("DocSign server starting...");

    app.rocket
        .mount("/", rocket::routes![
            docsign::views::upload_document,
            docsign::views::my_documents,
            docsign::views::document,
            docsign::views::document_audit,
            docsign::views::add_signers,
            docsign::views::signing_page,
            docsign::views::token_accept,
            docsign::views::token_reject,
            docsign::views::owner_accept,
            docsign::views::owner_reject,
            docsign::files::authenticated_files
        ])
        .launch()
        .await
        .map(|_| ())
}
