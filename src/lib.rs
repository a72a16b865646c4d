#[macro_use]
extern crate rocket;
#[macro_use]
extern crate diesel;
#[macro_use]
extern crate serde;
#[macro_use]
extern crate diesel_derive_enum;
#[macro_use]
extern crate lopdf;
#[macro_use]
extern crate log;

pub mod audit;
pub mod auth;
pub mod error;
pub mod files;
pub mod mail;
pub mod models;
pub mod pdf;
pub mod schema;
pub mod signing;
pub mod status;
pub mod storage;
pub mod store;
pub mod token;
pub mod views;

use std::sync::Arc;

use diesel_migrations::MigrationHarness;

pub const FILES_DIR: &str = "./files/";

pub const MIGRATIONS: diesel_migrations::EmbeddedMigrations =
    diesel_migrations::embed_migrations!("migrations");

fn from_base64<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = <String as serde::Deserialize>::deserialize(deserializer)?;
    base64::decode(&s).map_err(serde::de::Error::custom)
}

fn default_final_embed() -> bool {
    true
}

#[derive(Deserialize)]
pub struct SMTPAuth {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct SMTPConfig {
    pub server: String,
    pub port: u16,
    pub use_tls: bool,
    pub auth: Option<SMTPAuth>,
}

#[derive(Deserialize)]
pub struct Config {
    pub database_url: String,
    #[serde(deserialize_with = "from_base64")]
    pub files_key: Vec<u8>,
    #[serde(deserialize_with = "from_base64")]
    pub session_key: Vec<u8>,
    pub external_uri: String,
    pub mail_from: String,
    pub smtp: SMTPConfig,
    /// Stamp signatures onto the PDF as they come in and publish the result
    /// as a signed copy.
    #[serde(default = "default_final_embed")]
    pub final_embed: bool,
}

pub type AppService = signing::SigningService<store::pg::PgStore>;

pub struct App {
    pub rocket: rocket::Rocket<rocket::Build>,
}

pub async fn setup() -> App {
    let rocket = rocket::build();
    let figment = rocket.figment();
    let config: Config = figment.extract().expect("Unable to read config");

    let manager =
        diesel::r2d2::ConnectionManager::<diesel::PgConnection>::new(&config.database_url);
    let pool = r2d2::Pool::builder()
        .build(manager)
        .expect("Unable to connect to the database");
    pool.get()
        .expect("Unable to get a database connection")
        .run_pending_migrations(MIGRATIONS)
        .expect("Unable to run migrations");

    let store = Arc::new(store::pg::PgStore::new(pool));
    let object_storage: Arc<dyn storage::ObjectStorage> = Arc::new(storage::FsStorage);
    let transport: mail::EmailTransportType = Box::new(mail::smtp_transport(&config.smtp));
    let mailer = Arc::new(mail::Mailer::new(
        transport,
        &config.mail_from,
        config.external_uri.clone(),
    ));

    let service = AppService::new(store, object_storage, mailer, config.final_embed);

    App {
        rocket: rocket.manage(service).manage(config),
    }
}
