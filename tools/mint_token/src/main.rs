use std::env;

use attendance::auth::generate_jwt;
use attendance::config::AppConfig;
use attendance::db::{self, repository};

fn arg_value(name: &str) -> Option<String> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == name {
            return args.next();
        }
        if let Some(value) = arg.strip_prefix(&format!("{}=", name)) {
            return Some(value.to_string());
        }
    }
    None
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let Some(user_id) = arg_value("--user-id") else {
        eprintln!("usage: mint_token --user-id <id> [--ttl-minutes <n>]");
        std::process::exit(2);
    };

    let config = AppConfig::new_from_env()?;
    let ttl_minutes = match arg_value("--ttl-minutes") {
        Some(raw) => raw.parse()?,
        None => config.jwt_ttl_minutes,
    };

    let pool = db::connect(&config.database_url, 1).await?;
    let Some(user) = repository::find_user_by_id(&pool, &user_id).await? else {
        eprintln!("no user with id {}", user_id);
        std::process::exit(1);
    };

    let (token, expires_at) = generate_jwt(&user.id, user.role, &config.jwt_secret, ttl_minutes)?;
    eprintln!("{} ({:?}) valid until {}", user.name, user.role, expires_at);
    println!("{}", token);

    Ok(())
}
