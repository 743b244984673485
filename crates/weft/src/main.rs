use clap::{ArgAction, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use url::Url;
use weft::identity::WeftResolver;
use weft::identity::resolver::{
    DEFAULT_DOH_ENDPOINT, DEFAULT_PLC_DIRECTORY, IdentityResolver, ResolverOptions,
};
use weft::inspect::inspect;
use weft::service_auth::{ParsedJwt, ServiceAuthError};
use weft::types::string::{Did, Handle, Nsid, Tid};

#[derive(Parser, Debug)]
#[command(author, version, about = "weft - AT Protocol identifier and identity tool")]
struct Args {
    /// PLC directory used for did:plc lookups
    #[arg(long, global = true, default_value = DEFAULT_PLC_DIRECTORY)]
    plc_directory: Url,

    /// DNS-over-HTTPS JSON endpoint used for handle TXT lookups
    #[arg(long, global = true, default_value = DEFAULT_DOH_ENDPOINT)]
    doh_endpoint: Url,

    /// Log resolution steps to stderr (-vv for trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a string and print its parts
    Inspect {
        /// Identifier to inspect
        value: String,
    },
    /// Mint a TID from the current time, or decode one
    Tid {
        /// Clock identifier to mint with (0-1023)
        #[arg(long, default_value_t = 0)]
        clock_id: u16,
        /// Decode this TID instead of minting
        #[arg(long)]
        decode: Option<String>,
    },
    /// Resolve a handle to a DID
    ResolveHandle {
        /// Handle, e.g. alice.bsky.social
        handle: String,
        /// Also check that the DID document claims the handle back
        #[arg(long)]
        verify: bool,
    },
    /// Fetch and print a DID document
    ResolveDid {
        /// did:plc or did:web DID
        did: String,
    },
    /// Verify a service auth token
    VerifyJwt {
        /// Compact JWT
        token: String,
        /// Verify against this publicKeyMultibase value
        #[arg(long, required_unless_present = "resolve", conflicts_with = "resolve")]
        key: Option<String>,
        /// Verify against the #atproto key in the issuer's DID document
        #[arg(long)]
        resolve: bool,
        /// Require this audience DID
        #[arg(long)]
        aud: Option<String>,
        /// Require the token to be bound to this method NSID
        #[arg(long)]
        lxm: Option<String>,
        /// Seconds of clock skew to tolerate past `exp`
        #[arg(long, default_value_t = 0)]
        skew: i64,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let resolver = WeftResolver::new(
        reqwest::Client::new(),
        ResolverOptions::default(),
    )
    .with_plc_directory(args.plc_directory)
    .with_doh_endpoint(args.doh_endpoint);

    match args.command {
        Command::Inspect { value } => print_json(&inspect(&value)),
        Command::Tid { clock_id, decode } => {
            let tid = match decode {
                Some(tid) => Tid::new(&tid)?,
                None => Tid::now(clock_id)
                    .ok_or_else(|| miette::miette!("clock id must be below 1024"))?,
            };
            print_json(&inspect(tid.as_str()))
        }
        Command::ResolveHandle { handle, verify } => {
            let handle = Handle::new(&handle)?;
            let did = if verify {
                resolver.verify_handle(&handle).await?
            } else {
                resolver.resolve_handle(&handle).await?
            };
            print_json(&serde_json::json!({
                "handle": handle,
                "did": did,
                "verified": verify,
            }))
        }
        Command::ResolveDid { did } => {
            let did = Did::new(&did)?;
            let doc = resolver.resolve_did_doc(&did).await?;
            print_json(&doc)
        }
        Command::VerifyJwt {
            token,
            key,
            resolve: _,
            aud,
            lxm,
            skew,
        } => {
            let jwt = ParsedJwt::parse(&token)?;
            let verified = match key {
                Some(key) => jwt.verify(&key)?,
                None => {
                    let iss = jwt.unverified_claims().iss.clone();
                    let key = resolver.signing_key_for_did(&iss).await?;
                    jwt.verify_with(&key)?
                }
            };
            let claims = verified.claims();
            let now = chrono::Utc::now().timestamp();
            match aud {
                Some(aud) => claims.validate_at(&Did::new(&aud)?, now.saturating_sub(skew))?,
                None if claims.is_expired_with_skew(skew) => {
                    return Err(ServiceAuthError::Expired {
                        exp: claims.exp,
                        now,
                    }
                    .into());
                }
                None => {}
            }
            if let Some(lxm) = lxm {
                claims.require_method(&Nsid::new(&lxm)?)?;
            }
            print_json(&serde_json::json!({
                "alg": verified.header().alg.as_str(),
                "claims": claims,
            }))
        }
    }
}
