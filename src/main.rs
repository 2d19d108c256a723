//! SAML Role Agent
//!
//! Post-login hook for SAML single sign-on: looks up the SP session behind a
//! login, parses the cached assertion and logs the `Role` attribute values it
//! carries. Roles are reported, never assigned.

mod hook;
mod roles;
mod session;

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use hook::{HookConfig, HookConfigJson, LoginEvent, PostLoginAction};
use roles::AssertionRoleExtractor;
use session::{spawn_cleanup_task, CookieSessionLookup, SessionId, SessionStore, SpSession};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "saml-role-agent")]
#[command(about = "Extracts SAML role attributes from SP session assertions after login")]
struct Args {
    /// Path to a JSON configuration file
    #[arg(long, env = "SAML_ROLE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, env = "SAML_ROLE_VERBOSE", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract attribute values from an assertion and print them as JSON
    Extract {
        /// Assertion file, or "-" for stdin
        #[arg(long, default_value = "-")]
        input: String,

        /// Attribute name to select (defaults to the configured one)
        #[arg(long)]
        attribute: Option<String>,

        /// Input is a base64-encoded SAMLResponse value
        #[arg(long)]
        base64: bool,
    },

    /// Persist an SP session carrying an assertion, as done at SSO time
    Persist(PersistArgs),

    /// Delete an SP session, e.g. after Single Logout
    Logout {
        /// Session store path (overrides configuration)
        #[arg(long, env = "SAML_SESSION_STORE_PATH")]
        store: Option<PathBuf>,

        /// Hex-encoded session ID
        #[arg(long)]
        session_id: String,
    },

    /// Run the post-login hook for a request and print the role report
    PostLogin {
        /// Session store path (overrides configuration)
        #[arg(long, env = "SAML_SESSION_STORE_PATH")]
        store: Option<PathBuf>,

        /// Cookie header of the logged-in request
        #[arg(long)]
        cookie: String,

        /// Client IP of the request
        #[arg(long)]
        client_ip: Option<String>,
    },

    /// Periodically evict expired sessions until interrupted
    Maintain {
        /// Session store path (overrides configuration)
        #[arg(long, env = "SAML_SESSION_STORE_PATH")]
        store: Option<PathBuf>,

        /// Cleanup interval in seconds (overrides configuration)
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[derive(clap::Args, Debug)]
struct PersistArgs {
    /// Session store path (overrides configuration)
    #[arg(long, env = "SAML_SESSION_STORE_PATH")]
    store: Option<PathBuf>,

    /// User identifier (NameID)
    #[arg(long)]
    user: String,

    /// NameID format
    #[arg(long)]
    name_id_format: Option<String>,

    /// Assertion file, or "-" for stdin
    #[arg(long, default_value = "-")]
    input: String,

    /// Issuing IdP entity ID
    #[arg(long, default_value = "unknown")]
    idp: String,

    /// Session index from the AuthnStatement
    #[arg(long)]
    session_index: Option<String>,

    /// Client IP at session creation
    #[arg(long)]
    client_ip: Option<String>,

    /// Session TTL in seconds (overrides configuration)
    #[arg(long)]
    ttl_secs: Option<u64>,
}

/// Load configuration: defaults, then the optional JSON file.
fn load_config(path: Option<&Path>) -> Result<HookConfig> {
    let mut config = HookConfig::default();

    if let Some(path) = path {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let json: HookConfigJson = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        json.apply_to(&mut config);
    }

    config.validate().map_err(|e| anyhow!(e))?;
    Ok(config)
}

/// Read a file, or stdin for "-".
fn read_input(input: &str) -> Result<Vec<u8>> {
    if input == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read assertion from stdin")?;
        return Ok(buf);
    }

    std::fs::read(input).with_context(|| format!("Failed to read assertion: {}", input))
}

/// Decode a base64 SAMLResponse value, tolerating line breaks.
fn decode_saml_response(raw: &[u8]) -> Result<Vec<u8>> {
    let compact: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    BASE64
        .decode(compact)
        .context("Failed to decode SAML response")
}

fn open_store(store: Option<PathBuf>, config: &HookConfig) -> Result<Arc<SessionStore>> {
    let path = store.unwrap_or_else(|| PathBuf::from(&config.session_store_path));
    let store = SessionStore::open(&path, config.session_ttl_secs)?;
    info!(path = ?path, "Session store opened");
    Ok(Arc::new(store))
}

fn run_extract(
    config: &HookConfig,
    input: &str,
    attribute: Option<String>,
    base64: bool,
) -> Result<()> {
    let mut raw = read_input(input)?;
    if base64 {
        raw = decode_saml_response(&raw)?;
    }

    let extractor = AssertionRoleExtractor::new(config.attribute_name.clone(), config.max_nodes);
    let attribute = attribute.unwrap_or_else(|| config.attribute_name.clone());

    let roles = extractor.extract_roles(&raw, &attribute).map_err(|e| {
        error!(
            error_kind = %e.kind(),
            input_error = e.is_input_error(),
            error = %e,
            "Role extraction failed"
        );
        e
    })?;

    println!("{}", serde_json::to_string_pretty(&roles)?);
    Ok(())
}

fn run_persist(config: &HookConfig, args: PersistArgs) -> Result<()> {
    let raw = read_input(&args.input)?;
    let assertion_xml = String::from_utf8(raw).context("Assertion is not valid UTF-8")?;

    let store = open_store(args.store, config)?;
    let ttl = args.ttl_secs.unwrap_or_else(|| store.default_ttl_secs());

    let mut session = SpSession::new(args.user, args.idp, assertion_xml, ttl)?;
    session.name_id_format = args.name_id_format;
    session.session_index = args.session_index;
    session.client_ip = args.client_ip;

    let id = store.create(session)?;
    info!(session_id = %id, "SP session persisted");

    println!("{}", id);
    Ok(())
}

fn run_logout(config: &HookConfig, store: Option<PathBuf>, session_id: &str) -> Result<()> {
    let id = SessionId::from_hex(session_id)
        .ok_or_else(|| anyhow!("Invalid session ID: {}", session_id))?;

    let store = open_store(store, config)?;
    if store.delete(id)? {
        info!(session_id = %id, "SP session deleted");
    } else {
        warn!(session_id = %id, "SP session not found");
    }
    Ok(())
}

fn run_post_login(
    config: HookConfig,
    store: Option<PathBuf>,
    cookie: String,
    client_ip: Option<String>,
) -> Result<()> {
    let store = open_store(store, &config)?;
    let lookup = CookieSessionLookup::new(store, config.session_cookie_name.clone());
    let action = PostLoginAction::new(Arc::new(lookup), config)?;

    let mut headers = HashMap::new();
    headers.insert("Cookie".to_string(), vec![cookie]);
    let mut event = LoginEvent::new(headers);
    event.client_ip = client_ip;

    let report = action.process(&event)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_maintain(
    config: &HookConfig,
    store: Option<PathBuf>,
    interval_secs: Option<u64>,
) -> Result<()> {
    let store = open_store(store, config)?;
    let interval = interval_secs.unwrap_or(config.cleanup_interval_secs);

    let evicted = store.evict_expired()?;
    info!(evicted, interval_secs = interval, "Starting session cleanup task");

    let handle = spawn_cleanup_task(Arc::clone(&store), interval);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down session cleanup task");
    handle.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing; stdout is reserved for command output
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("{}={}", env!("CARGO_CRATE_NAME"), log_level))
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = load_config(args.config.as_deref())?;

    info!(
        attribute = %config.attribute_name,
        failure_policy = ?config.failure_policy,
        "Configuration loaded"
    );

    match args.command {
        Command::Extract {
            input,
            attribute,
            base64,
        } => run_extract(&config, &input, attribute, base64),
        Command::Persist(persist) => run_persist(&config, persist),
        Command::Logout { store, session_id } => run_logout(&config, store, &session_id),
        Command::PostLogin {
            store,
            cookie,
            client_ip,
        } => run_post_login(config, store, cookie, client_ip),
        Command::Maintain {
            store,
            interval_secs,
        } => run_maintain(&config, store, interval_secs).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::config::FailurePolicy;
    use tempfile::tempdir;

    #[test]
    fn test_load_config_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.attribute_name, "Role");
        assert_eq!(config.failure_policy, FailurePolicy::Degrade);
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"attribute-name": "Group", "failure-policy": "fail-closed"}"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.attribute_name, "Group");
        assert_eq!(config.failure_policy, FailurePolicy::FailClosed);
    }

    #[test]
    fn test_load_config_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"attribute-name": ""}"#).unwrap();
        assert!(load_config(Some(&path)).is_err());

        std::fs::write(&path, "not json").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_decode_saml_response() {
        let xml = r#"<Attribute Name="Role"><AttributeValue>Admin</AttributeValue></Attribute>"#;
        let mut encoded = BASE64.encode(xml);
        encoded.insert(10, '\n');

        let decoded = decode_saml_response(encoded.as_bytes()).unwrap();
        let roles = AssertionRoleExtractor::default().extract(&decoded).unwrap();
        assert_eq!(roles, vec!["Admin"]);

        assert!(decode_saml_response(b"!!!not base64").is_err());
    }

    #[test]
    fn test_read_input_missing_file() {
        assert!(read_input("/nonexistent/assertion.xml").is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let args = Args::try_parse_from([
            "saml-role-agent",
            "extract",
            "--input",
            "assertion.xml",
            "--attribute",
            "Group",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Command::Extract { ref attribute, base64: false, .. } if attribute.as_deref() == Some("Group")
        ));

        let args = Args::try_parse_from([
            "saml-role-agent",
            "--verbose",
            "post-login",
            "--store",
            "/tmp/s.redb",
            "--cookie",
            "saml_sp_session=abc",
        ])
        .unwrap();
        assert!(args.verbose);
        assert!(matches!(args.command, Command::PostLogin { .. }));

        let args = Args::try_parse_from([
            "saml-role-agent",
            "persist",
            "--store",
            "/tmp/s.redb",
            "--user",
            "user@example.com",
            "--input",
            "assertion.xml",
        ])
        .unwrap();
        match args.command {
            Command::Persist(persist) => {
                assert_eq!(persist.user, "user@example.com");
                assert_eq!(persist.idp, "unknown");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_persist_and_logout() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("sessions.redb");
        let assertion_path = dir.path().join("assertion.xml");
        std::fs::write(
            &assertion_path,
            r#"<Assertion><Attribute Name="Role"><AttributeValue>Admin</AttributeValue></Attribute></Assertion>"#,
        )
        .unwrap();

        let config = HookConfig::default();
        let persist = PersistArgs {
            store: Some(store_path.clone()),
            user: "user@example.com".to_string(),
            name_id_format: None,
            input: assertion_path.to_string_lossy().into_owned(),
            idp: "https://idp.example.com".to_string(),
            session_index: Some("_idx1".to_string()),
            client_ip: None,
            ttl_secs: Some(600),
        };
        run_persist(&config, persist).unwrap();

        let store = open_store(Some(store_path.clone()), &config).unwrap();
        assert_eq!(store.session_count().unwrap(), 1);
        drop(store);

        assert!(run_logout(&config, Some(store_path), "not-hex").is_err());
    }

    #[test]
    fn test_persist_rejects_huge_ttl() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("sessions.redb");
        let assertion_path = dir.path().join("assertion.xml");
        std::fs::write(&assertion_path, "<Assertion/>").unwrap();

        let config = HookConfig::default();
        let persist = PersistArgs {
            store: Some(store_path.clone()),
            user: "user@example.com".to_string(),
            name_id_format: None,
            input: assertion_path.to_string_lossy().into_owned(),
            idp: "https://idp.example.com".to_string(),
            session_index: None,
            client_ip: None,
            ttl_secs: Some(u64::MAX),
        };
        assert!(run_persist(&config, persist).is_err());

        let store = open_store(Some(store_path), &config).unwrap();
        assert_eq!(store.session_count().unwrap(), 0);
    }
}
