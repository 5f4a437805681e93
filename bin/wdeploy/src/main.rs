/* This file is part of DarkFi (https://dark.fi)
 *
 * Copyright (C) 2020-2025 Dyne.org foundation
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::{path::Path, process::exit, sync::Arc, time::Duration};

use rand::rngs::OsRng;
use structopt_toml::{
    serde::Deserialize,
    structopt::{clap::ErrorKind, StructOpt},
    StructOptToml,
};
use tinyjson::JsonValue;
use tracing::{debug, info};
use url::Url;

use wasmdeploy::{
    fee::{Coin, FeePolicy},
    identity::Identity,
    ledger::{LedgerClient, MemoryLedger, RpcLedgerClient},
    plan::{DeployPlan, StepOutput},
    registry::ArtifactRegistry,
    session::{ContractRef, DeploySession, InstantiateOptions},
    submitter::TxSubmitter,
    util::{
        file::spawn_config,
        path::{expand_path, get_config_path},
    },
    CallFailure, CallResult, Error, Result,
};

const CONFIG_FILE: &str = "wdeploy_config.toml";
const CONFIG_FILE_CONTENTS: &str = include_str!("../wdeploy_config.toml");

/// Exit code when a ledger call failed
const EXIT_CALL_FAILURE: i32 = 1;
/// Exit code on usage or configuration errors
const EXIT_USAGE: i32 = 2;

#[derive(Clone, Debug, Deserialize, StructOpt, StructOptToml)]
#[serde(default)]
#[structopt(
    name = "wdeploy",
    about = "Deploy and drive contracts on store/instantiate/execute ledgers"
)]
struct Args {
    #[structopt(short, long)]
    /// Configuration file to use
    config: Option<String>,

    #[structopt(short, long, default_value = "tcp://127.0.0.1:26657")]
    /// Ledger node JSON-RPC endpoint
    endpoint: Url,

    #[structopt(long, default_value = "localterra")]
    /// Chain id transactions are signed for
    chain_id: String,

    #[structopt(short, long, default_value = "~/.config/wasmdeploy/wdeploy.key")]
    /// Path to the signing key file
    keyfile: String,

    #[structopt(short, long, default_value = "~/.local/share/wasmdeploy/registry.json")]
    /// Path to the artifact registry
    registry: String,

    #[structopt(long, default_value = "4000000")]
    /// Gas limit attached to every transaction
    gas_limit: u64,

    #[structopt(long, default_value = "1000000uusd")]
    /// Flat transaction fee
    fee: String,

    #[structopt(long, default_value = "")]
    /// Memo attached to every transaction
    memo: String,

    #[structopt(long, default_value = "30")]
    /// Seconds to wait for a ledger reply
    timeout: u64,

    #[structopt(long)]
    /// Use an in-memory ledger, starting from an empty registry
    dry_run: bool,

    #[structopt(subcommand)]
    /// Sub command to execute
    command: Option<Subcmd>,

    #[structopt(short, parse(from_occurrences))]
    /// Increase verbosity (-vvv supported)
    verbose: u8,
}

#[derive(Clone, Debug, Deserialize, StructOpt)]
enum Subcmd {
    /// Generate a new signing key and write it to the key file
    Keygen {
        #[structopt(long)]
        /// Overwrite an existing key file
        force: bool,
    },

    /// Print the account address of the signing key
    Address,

    /// Upload contract bytecode
    Store {
        /// Logical contract name
        name: String,

        /// Path to the wasm bytecode
        wasm: String,
    },

    /// Instantiate stored code
    Instantiate {
        /// Logical contract name
        name: String,

        /// JSON instantiation message
        msg: String,

        #[structopt(long)]
        /// Code id to instantiate, defaults to the one recorded for the name
        code_id: Option<u64>,

        #[structopt(long)]
        /// Contract admin address
        admin: Option<String>,

        #[structopt(long)]
        /// Instance label, defaults to the logical name
        label: Option<String>,

        #[structopt(long, default_value = "")]
        /// Funds sent along, e.g. 100uusd,5uluna
        funds: String,
    },

    /// Execute a message against a contract
    Execute {
        /// Logical contract name, or an address with --address
        target: String,

        /// JSON execute message
        msg: String,

        #[structopt(long)]
        /// Treat the target as a literal contract address
        address: bool,

        #[structopt(long, default_value = "")]
        /// Funds sent along, e.g. 100uusd,5uluna
        funds: String,
    },

    /// Query a contract
    Query {
        /// Logical contract name, or an address with --address
        target: String,

        /// JSON query message
        msg: String,

        #[structopt(long)]
        /// Treat the target as a literal contract address
        address: bool,
    },

    /// Send funds to an account
    Send {
        /// Recipient address
        to: String,

        /// Amount, e.g. 100uusd,5uluna
        amount: String,
    },

    /// List recorded artifacts
    Artifacts,

    /// Run a deployment plan
    Run {
        /// Path to the plan file
        plan: String,

        #[structopt(long)]
        /// Run only the step with this name
        step: Option<String>,

        #[structopt(long)]
        /// Skip store and instantiate steps that already completed
        resume: bool,
    },
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt().with_max_level(level).with_writer(std::io::stderr).init();
}

fn parse_json(msg: &str) -> Result<JsonValue> {
    Ok(msg.parse()?)
}

fn contract_ref(target: String, address: bool) -> ContractRef {
    if address {
        ContractRef::Address(target)
    } else {
        ContractRef::Name(target)
    }
}

fn report_failure(failure: &CallFailure) {
    eprintln!("Error: {failure}");
    if let Some(raw) = &failure.raw {
        if let Ok(raw) = raw.format() {
            eprintln!("Ledger response:\n{raw}");
        }
    }
}

fn print_json(value: &JsonValue) {
    match value.format() {
        Ok(v) => println!("{v}"),
        Err(_) => println!("{value:?}"),
    }
}

/// Print a successful outcome, or report the failure. Returns whether
/// the call succeeded.
fn finish<T>(outcome: CallResult<T>, print: impl FnOnce(T)) -> bool {
    match outcome {
        Ok(v) => {
            print(v);
            true
        }
        Err(e) => {
            report_failure(&e);
            false
        }
    }
}

struct Wdeploy {
    session: DeploySession,
    registry_path: Option<std::path::PathBuf>,
}

impl Wdeploy {
    async fn new(args: &Args, identity: Identity, registry: ArtifactRegistry) -> Result<Self> {
        let fee = FeePolicy::parse(args.gas_limit, &args.fee)?;

        let ledger: Arc<dyn LedgerClient> = if args.dry_run {
            info!(target: "wdeploy", "Dry run on an in-memory ledger");
            Arc::new(MemoryLedger::new(&args.chain_id))
        } else {
            let timeout = Duration::from_secs(args.timeout);
            Arc::new(RpcLedgerClient::new(args.endpoint.clone(), timeout).await?)
        };

        let submitter =
            TxSubmitter::new(ledger, identity, &args.chain_id, fee).with_memo(&args.memo);
        let session = DeploySession::new(submitter).with_registry(registry);
        let registry_path = if args.dry_run { None } else { Some(expand_path(&args.registry)?) };

        Ok(Self { session, registry_path })
    }

    /// Persist whatever progress was made.
    async fn save(&self) -> Result<()> {
        if let Some(path) = &self.registry_path {
            self.session.save_registry(path).await?;
        }
        Ok(())
    }
}

/// Registry the session starts from. Dry runs get an empty one, as the
/// in-memory ledger knows nothing of what was deployed for real.
fn session_registry(args: &Args) -> Result<ArtifactRegistry> {
    if args.dry_run {
        return Ok(ArtifactRegistry::new())
    }
    ArtifactRegistry::load(&expand_path(&args.registry)?)
}

/// Returns `Ok(false)` when a ledger call failed.
async fn realmain(args: Args) -> Result<bool> {
    let Some(command) = args.command.clone() else {
        return Err(Error::ConfigError("No subcommand given, run with --help for usage".to_string()))
    };

    let keyfile = expand_path(&args.keyfile)?;

    match &command {
        Subcmd::Keygen { force } => {
            if keyfile.exists() {
                if !force {
                    return Err(Error::ConfigError(format!(
                        "Key file {keyfile:?} already exists, use --force to overwrite"
                    )))
                }
                std::fs::remove_file(&keyfile)?;
            }

            if let Some(parent) = keyfile.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let identity = Identity::generate(OsRng);
            identity.save(&keyfile)?;
            println!("Wrote new key to {keyfile:?}");
            println!("{}", identity.address());
            return Ok(true)
        }

        Subcmd::Address => {
            println!("{}", Identity::load(&keyfile)?.address());
            return Ok(true)
        }

        Subcmd::Artifacts => {
            let registry = ArtifactRegistry::load(&expand_path(&args.registry)?)?;
            if registry.is_empty() {
                println!("No artifacts recorded");
            }
            for artifact in registry.artifacts() {
                println!("{}: {}", artifact.logical_name, artifact.stage());
            }
            return Ok(true)
        }

        _ => {}
    }

    let identity = Identity::load(&keyfile)?;
    let registry = session_registry(&args)?;

    // The node may be unreachable; that is a failed call, not a usage error.
    let wdeploy = match Wdeploy::new(&args, identity, registry).await {
        Ok(w) => w,
        Err(e @ (Error::ConnectFailed | Error::ConnectTimeout)) => {
            report_failure(&CallFailure::transport(&e));
            return Ok(false)
        }
        Err(e) => return Err(e),
    };
    let session = &wdeploy.session;
    debug!(target: "wdeploy", "Signing as {}", session.address());

    let ok = match command {
        Subcmd::Store { name, wasm } => {
            let outcome = session.store_contract_file(&name, &expand_path(&wasm)?).await;
            finish(outcome, |id| println!("{name}: code id {id}"))
        }

        Subcmd::Instantiate { name, msg, code_id, admin, label, funds } => {
            let options =
                InstantiateOptions { admin, label, funds: Coin::parse_list(&funds)?, fee: None };
            let outcome =
                session.instantiate_contract_with(&name, code_id, parse_json(&msg)?, options).await;
            finish(outcome, |addr| println!("{name}: {addr}"))
        }

        Subcmd::Execute { target, msg, address, funds } => {
            let target = contract_ref(target, address);
            let funds = Coin::parse_list(&funds)?;
            let outcome =
                session.execute_contract_with(&target, parse_json(&msg)?, funds, None).await;
            finish(outcome, |rep| println!("Transaction {} accepted", rep.txhash))
        }

        Subcmd::Query { target, msg, address } => {
            let target = contract_ref(target, address);
            let outcome = session.query_contract(&target, &parse_json(&msg)?).await;
            finish(outcome, |v| print_json(&v))
        }

        Subcmd::Send { to, amount } => {
            let outcome = session.send_funds(&to, Coin::parse_list(&amount)?).await;
            finish(outcome, |rep| println!("Transaction {} accepted", rep.txhash))
        }

        Subcmd::Run { plan, step, resume } => {
            let plan = DeployPlan::load(&expand_path(&plan)?)?;
            let reports = plan.run(session, step.as_deref(), resume).await?;

            let mut ok = true;
            for report in reports {
                print!("[{}] ", report.name);
                ok &= finish(report.outcome, |out| match out {
                    StepOutput::CodeId(id) => println!("code id {id}"),
                    StepOutput::Address(addr) => println!("instantiated at {addr}"),
                    StepOutput::Tx(rep) => println!("transaction {} accepted", rep.txhash),
                    StepOutput::Query(v) => print_json(&v),
                    StepOutput::Skipped(stage) => println!("skipped, already {stage}"),
                });
            }
            ok
        }

        // Handled above without a ledger connection
        Subcmd::Keygen { .. } | Subcmd::Address | Subcmd::Artifacts => true,
    };

    wdeploy.save().await?;
    Ok(ok)
}

fn load_args() -> Result<Args> {
    // Validate the command line on its own first so usage errors get
    // their own exit code.
    let cli = match Args::from_iter_safe(std::env::args()) {
        Ok(v) => v,
        Err(e) if matches!(e.kind, ErrorKind::HelpDisplayed | ErrorKind::VersionDisplayed) => {
            e.exit()
        }
        Err(e) => {
            eprintln!("{}", e.message);
            exit(EXIT_USAGE)
        }
    };

    let config_path = get_config_path(cli.config, CONFIG_FILE)?;
    spawn_config(&config_path, CONFIG_FILE_CONTENTS)?;

    let toml_str = std::fs::read_to_string(Path::new(&config_path))?;
    Args::from_args_with_toml(&toml_str)
        .map_err(|e| Error::ConfigError(format!("{config_path:?}: {e}")))
}

fn main() {
    let args = match load_args() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {e}");
            exit(EXIT_USAGE)
        }
    };

    setup_logging(args.verbose);

    match smol::block_on(realmain(args)) {
        Ok(true) => {}
        Ok(false) => exit(EXIT_CALL_FAILURE),
        Err(e) => {
            eprintln!("Error: {e}");
            exit(EXIT_USAGE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn default_config_parses() {
        let args = Args::from_iter_with_toml(CONFIG_FILE_CONTENTS, ["wdeploy", "address"]).unwrap();
        assert_eq!(args.chain_id, "localterra");
        assert_eq!(args.gas_limit, 4_000_000);
        assert!(!args.dry_run);
        assert!(FeePolicy::parse(args.gas_limit, &args.fee).is_ok());
    }

    #[test]
    fn flags_override_config() {
        let args = Args::from_iter_with_toml(
            CONFIG_FILE_CONTENTS,
            ["wdeploy", "--chain-id", "bombay-12", "--dry-run", "query", "pool", "{}"],
        )
        .unwrap();
        assert_eq!(args.chain_id, "bombay-12");
        assert!(args.dry_run);
        assert!(matches!(args.command, Some(Subcmd::Query { address: false, .. })));
    }

    #[test]
    fn dry_run_ignores_recorded_artifacts() {
        let dir = TempDir::new("wdeploy").unwrap();
        let path = dir.path().join("registry.json");

        let mut registry = ArtifactRegistry::new();
        registry.entry("vault").set_instance(7, "terra1realaddr");
        registry.save(&path).unwrap();

        let registry_flag = path.to_str().unwrap();
        let args = Args::from_iter_with_toml(
            CONFIG_FILE_CONTENTS,
            ["wdeploy", "--registry", registry_flag, "artifacts"],
        )
        .unwrap();
        assert_eq!(session_registry(&args).unwrap(), registry);

        let args = Args::from_iter_with_toml(
            CONFIG_FILE_CONTENTS,
            ["wdeploy", "--registry", registry_flag, "--dry-run", "artifacts"],
        )
        .unwrap();
        assert!(session_registry(&args).unwrap().is_empty());

        // A name from the real registry is unknown to the dry run, which
        // fails before reaching the ledger
        smol::block_on(async {
            let ledger = Arc::new(MemoryLedger::new(&args.chain_id));
            let identity = Identity::from_seed([1u8; 32]);
            let submitter =
                TxSubmitter::new(ledger, identity, &args.chain_id, FeePolicy::default());
            let session =
                DeploySession::new(submitter).with_registry(session_registry(&args).unwrap());

            let target = ContractRef::name("vault");
            let err = session.execute_contract(&target, JsonValue::Null).await.unwrap_err();
            assert_eq!(err.kind, wasmdeploy::FailureKind::UnknownContract);

            // While a full store and instantiate works end to end
            session.store_contract("vault", b"\0asm").await.unwrap();
            let init = JsonValue::Object(Default::default());
            session.instantiate_contract("vault", None, init).await.unwrap();
        });
    }
}
