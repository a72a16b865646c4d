//! Mints an owner session token from the command line. Sessions are issued
//! out of band; there is no password login on the HTTP surface.

fn main() {
    let arg = match std::env::args().nth(1) {
        Some(a) => a,
        None => {
            eprintln!("usage: mint_session <owner-uuid>");
            std::process::exit(1);
        }
    };
    let owner_id = match uuid::Uuid::parse_str(&arg) {
        Ok(id) => id,
        Err(err) => {
            eprintln!("invalid owner UUID: {}", err);
            std::process::exit(1);
        }
    };

    let config: docsign::Config = rocket::Config::figment()
        .extract()
        .expect("Unable to read config");

    println!("{}", docsign::auth::issue_session(owner_id, &config.session_key));
}
