//! `pk-grant-helper`: the privileged writer process the explicit-grant
//! flow spawns (`spec.md` §6 "Process model", §4.8). `pk_engine::grant`
//! is the unprivileged caller-side half that dispatches here; this
//! binary is the one that actually appends to the store, the way
//! `polkit-explicit-grant-helper` is a separate setuid binary from
//! `libpolkit-grant` in the original implementation -- it reads no
//! stdin and communicates its verdict purely through its exit code.
//!
//! Real deployment runs this setuid/setgid to the service account so it
//! can write a uid's store file the invoking process can't; that
//! privilege boundary is outside what this crate can express, so here
//! it just checks `getuid()` the same way the real binary would check
//! its real (not effective) uid.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use error_trace::ErrorTrace as _;
use humanlog::{DebugMode, HumanLogger};
use log::{error, info, warn};
use pk_config::ConfigTree;
use pk_constraints::ConstraintSet;
use pk_engine::{decide, Subject, ACTION_GRANT};
use pk_identity::{ActionId, Caller, ProcessStartTime};
use pk_policy::PolicyCache;
use pk_store::{AuthStore, Entry, Scope, SystemUserNameResolver};
use thiserror::Error;

#[derive(Debug, Error)]
enum HelperError {
    #[error("failed to load policy directory {path:?}: {source}")]
    PolicyLoad { path: PathBuf, #[source] source: pk_policy::PolicyLoadError },

    #[error("failed to load configuration file {path:?}: {source}")]
    ConfigLoad { path: PathBuf, #[source] source: pk_config::ConfigLoadError },

    #[error("invalid mode {0:?}, expected \"uid\" or \"uid-negative\"")]
    InvalidMode(String),

    #[error(transparent)]
    Action(#[from] pk_identity::IdentityError),

    #[error(transparent)]
    Constraint(#[from] pk_constraints::ConstraintError),

    #[error(transparent)]
    Decision(#[from] pk_engine::DecisionError),

    #[error(transparent)]
    Store(#[from] pk_store::StoreError),

    #[error("uid {0} is not authorized to grant authorizations (requires {ACTION_GRANT})")]
    NotAuthorized(u32),
}

/// Whether a failure is a parse/setup problem (exit `2`) or a plain
/// policy-denial (exit `1`) -- `spec.md` §6's two-way non-zero contract.
impl HelperError {
    fn is_policy_violation(&self) -> bool { matches!(self, HelperError::NotAuthorized(_)) }
}

/// Arguments for the privileged writer helper: positional, not
/// environment-backed, since this binary is invoked by
/// `pk_engine::grant::request_grant` rather than a human operator
/// (`spec.md` §6 "Process model").
#[derive(Debug, Parser)]
#[command(about = "Appends one explicit authorization entry to the store on behalf of its real (not effective) invoking uid")]
struct Arguments {
    #[clap(long, global = true)]
    trace: bool,

    #[clap(long, env = "POLICYKIT_POLICY_DIR", default_value = "/usr/share/polkit-1/actions")]
    policy_dir: PathBuf,
    #[clap(long, env = "POLICYKIT_CONFIG_FILE", default_value = "/etc/PolicyKit/PolicyKit.conf")]
    config_file: PathBuf,
    #[clap(long, env = "POLICYKIT_PERSISTENT_ROOT", default_value = "/var/lib/polkit-1")]
    persistent_root: PathBuf,
    #[clap(long, env = "POLICYKIT_TRANSIENT_ROOT", default_value = "/run/polkit-1")]
    transient_root: PathBuf,
    #[clap(long, env = "POLICYKIT_RELOAD_TRIGGER", default_value = "/run/polkit-1/reload-trigger")]
    reload_trigger: PathBuf,

    /// The action id being granted.
    action_id: String,
    /// Comma-separated constraint tokens, or empty for none.
    constraints: String,
    /// `uid` for a positive grant, `uid-negative` for a veto.
    mode: String,
    /// The uid the authorization is recorded against.
    target_uid: u32,
}

fn run(args: &Arguments) -> Result<(), HelperError> {
    let negative = match args.mode.as_str() {
        "uid" => false,
        "uid-negative" => true,
        other => return Err(HelperError::InvalidMode(other.to_string())),
    };

    let (policy, diagnostics) =
        PolicyCache::load(&args.policy_dir).map_err(|source| HelperError::PolicyLoad { path: args.policy_dir.clone(), source })?;
    for diagnostic in &diagnostics {
        warn!("policy load diagnostic: {diagnostic}");
    }

    let config = if args.config_file.exists() {
        pk_config::load_config_file(&args.config_file).map_err(|source| HelperError::ConfigLoad { path: args.config_file.clone(), source })?
    } else {
        ConfigTree::default()
    };

    let store = AuthStore::with_resolver(args.persistent_root.clone(), args.transient_root.clone(), args.reload_trigger.clone(), Box::new(SystemUserNameResolver));

    let action_id = ActionId::new(&args.action_id)?;
    let constraints = ConstraintSet::parse_comma_separated(&args.constraints)?;

    let invoking_uid = real_uid();
    // A self-grant of a *negative* authorization is always permitted --
    // a user may always veto an action for themselves without holding
    // the grant meta-action (`spec.md` §7.7, mirroring the doc comment
    // on `polkit_authorization_db_grant_negative_to_uid`).
    let self_negative_grant = negative && invoking_uid == args.target_uid;
    if !self_negative_grant {
        let meta_action = ActionId::new(ACTION_GRANT).expect("constant is a valid action identifier");
        let caller = Caller::new(None, invoking_uid, std::process::id() as i64, ProcessStartTime(0), None, None)?;
        let subject = Subject::Caller(caller);
        if decide(&policy, &config, &store, &meta_action, &subject, false)? != pk_identity::Decision::Yes {
            return Err(HelperError::NotAuthorized(invoking_uid));
        }
    }

    let entry = Entry {
        scope: if negative { Scope::GrantNegative } else { Scope::Grant },
        action_id,
        when: unix_time_now(),
        auth_as: None,
        granted_by: Some(invoking_uid),
        constraints,
    };
    store.append(args.target_uid, &entry)?;
    info!("recorded {} grant of {} to uid {}", if negative { "negative" } else { "positive" }, args.action_id, args.target_uid);
    Ok(())
}

#[cfg(unix)]
fn real_uid() -> u32 { nix::unistd::getuid().as_raw() }

#[cfg(not(unix))]
fn real_uid() -> u32 { 0 }

fn unix_time_now() -> u64 { std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0) }

fn main() -> ExitCode {
    let args = Arguments::parse();

    if let Err(err) = HumanLogger::terminal(if args.trace { DebugMode::Full } else { DebugMode::Debug }).init() {
        eprintln!("WARNING: Failed to setup logger: {err} (no logging for this session)");
    }
    info!("{} - v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err.trace());
            if err.is_policy_violation() { ExitCode::from(1) } else { ExitCode::from(2) }
        },
    }
}
