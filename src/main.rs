//! `pk-decide`: a thin diagnostic binary over the authorization core.
//!
//! This is not a `pkaction`/`pkcheck` replacement -- command-line
//! frontends are explicitly out of scope (`spec.md` §1 Non-goals). It
//! exists so the engine can be exercised against real on-disk policy
//! files, a configuration override tree and a grant store from a
//! terminal, the way `policy-reasoner`'s `src/main.rs` is a thin wrapper
//! around `Srv` rather than the place any policy logic lives.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use error_trace::ErrorTrace as _;
use humanlog::{DebugMode, HumanLogger};
use log::{error, info, warn};
use pk_config::ConfigTree;
use pk_engine::{decide, resolve_admin_identities, DecisionError, Subject};
use pk_identity::{ActionId, Caller, Decision, IdentityError, ProcessStartTime};
use pk_policy::PolicyCache;
use pk_store::{AuthStore, DecimalUserNameResolver, SystemUserNameResolver};
use thiserror::Error;

/// Errors this binary can surface, wrapping each library crate's own
/// error type rather than flattening them into a string (`spec.md` §7
/// "Propagation").
#[derive(Debug, Error)]
enum CliError {
    #[error("failed to load policy directory {path:?}")]
    PolicyLoad { path: PathBuf, #[source] source: pk_policy::PolicyLoadError },

    #[error("failed to load configuration file {path:?}")]
    ConfigLoad { path: PathBuf, #[source] source: pk_config::ConfigLoadError },

    #[error("invalid action or caller identity")]
    Identity(#[from] IdentityError),

    #[error("decision failed")]
    Decision(#[from] DecisionError),
}

/// Arguments for the `pk-decide` diagnostic binary.
#[derive(Debug, Parser)]
#[command(about = "Evaluate a PolicyKit authorization decision against on-disk policy, configuration and grant stores")]
struct Arguments {
    /// If given, enables more verbose debugging.
    #[clap(long, global = true)]
    trace: bool,

    /// Directory of `.policy` files (`spec.md` §4.2).
    #[clap(long, env = "POLICYKIT_POLICY_DIR", default_value = "/usr/share/polkit-1/actions")]
    policy_dir: PathBuf,

    /// Configuration override file (`spec.md` §4.3). Missing is treated
    /// as an empty override tree, not an error.
    #[clap(long, env = "POLICYKIT_CONFIG_FILE", default_value = "/etc/PolicyKit/PolicyKit.conf")]
    config_file: PathBuf,

    /// Root of the persistent (`always`/`grant*`) authorization store.
    #[clap(long, env = "POLICYKIT_PERSISTENT_ROOT", default_value = "/var/lib/polkit-1")]
    persistent_root: PathBuf,

    /// Root of the transient (`process*`/`session`) authorization store.
    #[clap(long, env = "POLICYKIT_TRANSIENT_ROOT", default_value = "/run/polkit-1")]
    transient_root: PathBuf,

    /// Reload-trigger file touched after every store write.
    #[clap(long, env = "POLICYKIT_RELOAD_TRIGGER", default_value = "/run/polkit-1/reload-trigger")]
    reload_trigger: PathBuf,

    /// Resolve `user-<name>.auths` filenames against the decimal uid
    /// rather than the system account database -- useful when running
    /// against a scratch store that has no matching `/etc/passwd` entry.
    #[clap(long)]
    decimal_usernames: bool,

    /// The dotted action identifier to decide, e.g. `org.example.frotz`.
    action: String,

    /// The caller's uid.
    #[clap(long, default_value_t = 0)]
    uid: u32,

    /// The caller's pid. Must be positive (`spec.md` §3 invariant).
    #[clap(long, default_value_t = std::process::id() as i64)]
    pid: i64,

    /// The caller's kernel-reported process start time, used together
    /// with `--pid` to disambiguate against pid reuse.
    #[clap(long, default_value_t = 0)]
    start_time: u64,

    /// Consume a matching `process-one-shot` grant if the decision used
    /// one. Off by default so repeated diagnostic runs don't spend
    /// one-shot grants a real mechanism hasn't actually acted on yet.
    #[clap(long)]
    revoke_if_one_shot: bool,
}

fn run(args: &Arguments) -> Result<Decision, CliError> {
    let (policy, diagnostics) =
        PolicyCache::load(&args.policy_dir).map_err(|source| CliError::PolicyLoad { path: args.policy_dir.clone(), source })?;
    for diagnostic in &diagnostics {
        warn!("policy load diagnostic: {diagnostic}");
    }
    info!("loaded {} declared actions from {:?}", policy.len(), args.policy_dir);

    let config = if args.config_file.exists() {
        pk_config::load_config_file(&args.config_file).map_err(|source| CliError::ConfigLoad { path: args.config_file.clone(), source })?
    } else {
        info!("no configuration file at {:?}, using the empty override tree", args.config_file);
        ConfigTree::default()
    };

    let resolver: Box<dyn pk_store::UserNameResolver> = if args.decimal_usernames { Box::new(DecimalUserNameResolver) } else { Box::new(SystemUserNameResolver) };
    let store = AuthStore::with_resolver(args.persistent_root.clone(), args.transient_root.clone(), args.reload_trigger.clone(), resolver);

    let action_id = ActionId::new(&args.action)?;
    let caller = Caller::new(None, args.uid, args.pid, ProcessStartTime(args.start_time), None, None)?;
    let subject = Subject::Caller(caller);

    let result = decide(&policy, &config, &store, &action_id, &subject, args.revoke_if_one_shot)?;

    if result.is_auth_required() {
        if let Some(identities) = resolve_admin_identities(&config, action_id.as_str(), &args.uid.to_string(), &store.user_name_for_uid(args.uid)) {
            if !identities.is_empty() {
                info!("admin identities for {}: users={:?} groups={:?}", args.action, identities.users, identities.groups);
            }
        }
    }

    Ok(result)
}

fn main() -> ExitCode {
    let args = Arguments::parse();

    if let Err(err) = HumanLogger::terminal(if args.trace { DebugMode::Full } else { DebugMode::Debug }).init() {
        eprintln!("WARNING: Failed to setup logger: {err} (no logging for this session)");
    }
    info!("{} - v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match run(&args) {
        Ok(result) => {
            println!("{}", result.to_name());
            if matches!(result, Decision::Yes) { ExitCode::SUCCESS } else { ExitCode::from(1) }
        },
        Err(err) => {
            error!("{}", err.trace());
            ExitCode::from(2)
        },
    }
}
