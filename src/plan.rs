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

//! Deployment plans.
//!
//! A plan is a TOML file holding an ordered list of named steps:
//!
//! ```toml
//! [[step]]
//! name = "upload-vault"
//! action = "store"
//! contract = "vault"
//! wasm = "artifacts/vault.wasm"
//!
//! [[step]]
//! name = "init-vault"
//! action = "instantiate"
//! contract = "vault"
//! msg = '{"owner": "terra1..."}'
//! ```
//!
//! Steps run in file order and stop at the first failure. A single step
//! can be selected by name instead, which replaces the habit of
//! commenting out the parts of a script that should not run.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tinyjson::JsonValue;
use tracing::{info, warn};

use crate::{
    error::CallResult,
    fee::Coin,
    registry::ArtifactStage,
    session::{ContractRef, DeploySession, InstantiateOptions},
    tx::TxResponse,
    util::file::load_file,
    Error, Result,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPlan {
    #[serde(default)]
    step: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    name: String,
    #[serde(flatten)]
    action: RawAction,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum RawAction {
    Store {
        contract: String,
        wasm: String,
    },
    Instantiate {
        contract: String,
        code_id: Option<u64>,
        msg: String,
        admin: Option<String>,
        label: Option<String>,
        #[serde(default)]
        funds: String,
    },
    Execute {
        contract: Option<String>,
        address: Option<String>,
        msg: String,
        #[serde(default)]
        funds: String,
    },
    Query {
        contract: Option<String>,
        address: Option<String>,
        msg: String,
    },
    Send {
        to: String,
        amount: String,
    },
}

/// A validated plan step action
#[derive(Clone, Debug, PartialEq)]
pub enum StepAction {
    Store { contract: String, wasm: PathBuf },
    Instantiate {
        contract: String,
        code_id: Option<u64>,
        msg: JsonValue,
        admin: Option<String>,
        label: Option<String>,
        funds: Vec<Coin>,
    },
    Execute { target: ContractRef, msg: JsonValue, funds: Vec<Coin> },
    Query { target: ContractRef, msg: JsonValue },
    Send { to: String, amount: Vec<Coin> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlanStep {
    pub name: String,
    pub action: StepAction,
}

/// What a step produced
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutput {
    CodeId(u64),
    Address(String),
    Tx(TxResponse),
    Query(JsonValue),
    /// Skipped on resume, the artifact was already at this stage
    Skipped(ArtifactStage),
}

#[derive(Clone, Debug)]
pub struct StepReport {
    pub name: String,
    pub outcome: CallResult<StepOutput>,
}

/// An ordered list of deployment steps
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeployPlan {
    pub steps: Vec<PlanStep>,
}

/// Keys a step may carry, per action
fn allowed_keys(action: &str) -> Option<&'static [&'static str]> {
    let keys: &'static [&'static str] = match action {
        "store" => &["name", "action", "contract", "wasm"],
        "instantiate" => {
            &["name", "action", "contract", "code_id", "msg", "admin", "label", "funds"]
        }
        "execute" => &["name", "action", "contract", "address", "msg", "funds"],
        "query" => &["name", "action", "contract", "address", "msg"],
        "send" => &["name", "action", "to", "amount"],
        _ => return None,
    };
    Some(keys)
}

/// Flattened steps accept any extra key, so misspelled keys are caught
/// here before they are silently dropped.
fn check_step_keys(toml_str: &str) -> Result<()> {
    let table: toml::Table = toml_str.parse().map_err(|e| Error::PlanError(format!("{e}")))?;
    let Some(toml::Value::Array(steps)) = table.get("step") else { return Ok(()) };

    for step in steps {
        let Some(step) = step.as_table() else { continue };
        let name = step.get("name").and_then(|v| v.as_str()).unwrap_or("<unnamed>");
        // Unknown or missing actions are reported by the deserializer
        let Some(keys) = step.get("action").and_then(|v| v.as_str()).and_then(allowed_keys)
        else {
            continue
        };

        if let Some(key) = step.keys().find(|k| !keys.contains(&k.as_str())) {
            return Err(Error::PlanError(format!("step \"{name}\": unknown key \"{key}\"")))
        }
    }

    Ok(())
}

fn parse_msg(step: &str, msg: &str) -> Result<JsonValue> {
    msg.parse()
        .map_err(|e| Error::PlanError(format!("step \"{step}\": invalid JSON message: {e}")))
}

fn parse_funds(step: &str, funds: &str) -> Result<Vec<Coin>> {
    Coin::parse_list(funds).map_err(|e| Error::PlanError(format!("step \"{step}\": {e}")))
}

fn parse_target(
    step: &str,
    contract: Option<String>,
    address: Option<String>,
) -> Result<ContractRef> {
    match (contract, address) {
        (Some(c), None) => Ok(ContractRef::Name(c)),
        (None, Some(a)) => Ok(ContractRef::Address(a)),
        _ => Err(Error::PlanError(format!(
            "step \"{step}\": exactly one of \"contract\" or \"address\" is required"
        ))),
    }
}

impl DeployPlan {
    /// Parse a plan. Relative bytecode paths are resolved against
    /// `base_dir`.
    pub fn parse(toml_str: &str, base_dir: &Path) -> Result<Self> {
        check_step_keys(toml_str)?;
        let raw: RawPlan =
            toml::from_str(toml_str).map_err(|e| Error::PlanError(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut steps = Vec::with_capacity(raw.step.len());

        for RawStep { name, action } in raw.step {
            if !seen.insert(name.clone()) {
                return Err(Error::PlanError(format!("duplicate step name \"{name}\"")))
            }

            let action = match action {
                RawAction::Store { contract, wasm } => {
                    StepAction::Store { contract, wasm: base_dir.join(wasm) }
                }
                RawAction::Instantiate { contract, code_id, msg, admin, label, funds } => {
                    StepAction::Instantiate {
                        contract,
                        code_id,
                        msg: parse_msg(&name, &msg)?,
                        admin,
                        label,
                        funds: parse_funds(&name, &funds)?,
                    }
                }
                RawAction::Execute { contract, address, msg, funds } => StepAction::Execute {
                    target: parse_target(&name, contract, address)?,
                    msg: parse_msg(&name, &msg)?,
                    funds: parse_funds(&name, &funds)?,
                },
                RawAction::Query { contract, address, msg } => StepAction::Query {
                    target: parse_target(&name, contract, address)?,
                    msg: parse_msg(&name, &msg)?,
                },
                RawAction::Send { to, amount } => {
                    StepAction::Send { to, amount: parse_funds(&name, &amount)? }
                }
            };

            steps.push(PlanStep { name, action });
        }

        Ok(Self { steps })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let base_dir = path.parent().unwrap_or(Path::new("."));
        Self::parse(&load_file(path)?, base_dir)
    }

    pub fn step(&self, name: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Run the plan, or only the step called `only`. Execution stops at
    /// the first failed step; its report is the last one returned.
    ///
    /// With `resume`, store and instantiate steps whose artifact already
    /// reached that stage are skipped.
    pub async fn run(
        &self,
        session: &DeploySession,
        only: Option<&str>,
        resume: bool,
    ) -> Result<Vec<StepReport>> {
        let steps: Vec<&PlanStep> = match only {
            Some(name) => match self.step(name) {
                Some(s) => vec![s],
                None => return Err(Error::PlanError(format!("no step named \"{name}\""))),
            },
            None => self.steps.iter().collect(),
        };

        let mut reports = vec![];
        for step in steps {
            info!(target: "wasmdeploy::plan", "Running step \"{}\"", step.name);
            let outcome = run_step(session, &step.action, resume).await;
            let failed = outcome.is_err();

            if let Err(e) = &outcome {
                warn!(target: "wasmdeploy::plan", "Step \"{}\" failed: {e}", step.name);
            }

            reports.push(StepReport { name: step.name.clone(), outcome });
            if failed {
                break
            }
        }

        Ok(reports)
    }
}

async fn run_step(
    session: &DeploySession,
    action: &StepAction,
    resume: bool,
) -> CallResult<StepOutput> {
    match action {
        StepAction::Store { contract, wasm } => {
            let stage = session.stage(contract).await;
            if resume && stage != ArtifactStage::Unknown {
                return Ok(StepOutput::Skipped(stage))
            }
            Ok(StepOutput::CodeId(session.store_contract_file(contract, wasm).await?))
        }

        StepAction::Instantiate { contract, code_id, msg, admin, label, funds } => {
            let stage = session.stage(contract).await;
            if resume && matches!(stage, ArtifactStage::Instantiated(..)) {
                return Ok(StepOutput::Skipped(stage))
            }

            let options = InstantiateOptions {
                admin: admin.clone(),
                label: label.clone(),
                funds: funds.clone(),
                fee: None,
            };
            let address =
                session.instantiate_contract_with(contract, *code_id, msg.clone(), options).await?;
            Ok(StepOutput::Address(address))
        }

        StepAction::Execute { target, msg, funds } => {
            let rep =
                session.execute_contract_with(target, msg.clone(), funds.clone(), None).await?;
            Ok(StepOutput::Tx(rep))
        }

        StepAction::Query { target, msg } => {
            Ok(StepOutput::Query(session.query_contract(target, msg).await?))
        }

        StepAction::Send { to, amount } => {
            Ok(StepOutput::Tx(session.send_funds(to, amount.clone()).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        fee::FeePolicy, identity::Identity, ledger::MemoryLedger, submitter::TxSubmitter,
        FailureKind,
    };
    use tempdir::TempDir;

    const PLAN: &str = r#"
[[step]]
name = "upload"
action = "store"
contract = "vault"
wasm = "vault.wasm"

[[step]]
name = "init"
action = "instantiate"
contract = "vault"
msg = '{"owner": "me"}'
label = "vault v1"

[[step]]
name = "deposit"
action = "execute"
contract = "vault"
msg = '{"deposit": {}}'
funds = "100uusd"

[[step]]
name = "state"
action = "query"
contract = "vault"
msg = '{"state": {}}'
"#;

    fn session() -> DeploySession {
        let ledger = Arc::new(MemoryLedger::new("testnet"));
        let identity = Identity::from_seed([6u8; 32]);
        let submitter = TxSubmitter::new(ledger, identity, "testnet", FeePolicy::default());
        DeploySession::new(submitter)
    }

    #[test]
    fn parse_steps() {
        let plan = DeployPlan::parse(PLAN, Path::new("/plans")).unwrap();
        assert_eq!(plan.steps.len(), 4);

        let StepAction::Store { wasm, .. } = &plan.steps[0].action else { panic!("not a store") };
        assert_eq!(wasm, &PathBuf::from("/plans/vault.wasm"));

        let StepAction::Execute { target, funds, .. } = &plan.steps[2].action else {
            panic!("not an execute")
        };
        assert_eq!(target, &ContractRef::name("vault"));
        assert_eq!(funds, &vec![Coin::new(100, "uusd")]);
    }

    #[test]
    fn reject_bad_plans() {
        let dup = "[[step]]\nname = \"a\"\naction = \"send\"\nto = \"x\"\namount = \"1uusd\"\n\
                   [[step]]\nname = \"a\"\naction = \"send\"\nto = \"y\"\namount = \"1uusd\"\n";
        assert!(matches!(DeployPlan::parse(dup, Path::new(".")), Err(Error::PlanError(_))));

        let bad_json =
            "[[step]]\nname = \"q\"\naction = \"query\"\naddress = \"a\"\nmsg = \"{oops\"\n";
        assert!(matches!(DeployPlan::parse(bad_json, Path::new(".")), Err(Error::PlanError(_))));

        let both = "[[step]]\nname = \"q\"\naction = \"query\"\naddress = \"a\"\n\
                    contract = \"b\"\nmsg = \"{}\"\n";
        assert!(matches!(DeployPlan::parse(both, Path::new(".")), Err(Error::PlanError(_))));

        let unknown = "[[step]]\nname = \"q\"\naction = \"migrate\"\n";
        assert!(matches!(DeployPlan::parse(unknown, Path::new(".")), Err(Error::PlanError(_))));
    }

    #[test]
    fn reject_misspelled_keys() {
        // "fund" instead of "funds" would otherwise deposit nothing
        let typo = PLAN.replace("funds = \"100uusd\"", "fund = \"100uusd\"");
        let Err(Error::PlanError(msg)) = DeployPlan::parse(&typo, Path::new(".")) else {
            panic!("misspelled key accepted")
        };
        assert_eq!(msg, "step \"deposit\": unknown key \"fund\"");

        // A key valid for another action is still rejected
        let stray = "[[step]]\nname = \"s\"\naction = \"send\"\nto = \"x\"\namount = \"1uusd\"\n\
                     msg = \"{}\"\n";
        assert!(matches!(DeployPlan::parse(stray, Path::new(".")), Err(Error::PlanError(_))));
    }

    #[test]
    fn run_all_then_resume() {
        let dir = TempDir::new("wasmdeploy").unwrap();
        std::fs::write(dir.path().join("vault.wasm"), b"\0asm").unwrap();
        let plan = DeployPlan::parse(PLAN, dir.path()).unwrap();

        smol::block_on(async {
            let s = session();
            let reports = plan.run(&s, None, false).await.unwrap();
            assert_eq!(reports.len(), 4);
            assert!(reports.iter().all(|r| r.outcome.is_ok()));
            assert!(matches!(reports[1].outcome, Ok(StepOutput::Address(_))));

            let reports = plan.run(&s, None, true).await.unwrap();
            assert!(matches!(
                reports[0].outcome,
                Ok(StepOutput::Skipped(ArtifactStage::Instantiated(..)))
            ));
            assert!(matches!(reports[1].outcome, Ok(StepOutput::Skipped(_))));
            assert!(matches!(reports[2].outcome, Ok(StepOutput::Tx(_))));
        });
    }

    #[test]
    fn stop_at_first_failure() {
        // Bytecode file is missing, so nothing after the store step runs
        let plan = DeployPlan::parse(PLAN, Path::new("/nonexistent")).unwrap();

        smol::block_on(async {
            let s = session();
            let reports = plan.run(&s, None, false).await.unwrap();
            assert_eq!(reports.len(), 1);
            assert_eq!(reports[0].outcome.as_ref().unwrap_err().kind, FailureKind::Precondition);

            // Selecting a single step runs only that one
            let reports = plan.run(&s, Some("deposit"), false).await.unwrap();
            assert_eq!(reports.len(), 1);
            let failure = reports[0].outcome.as_ref().unwrap_err();
            assert_eq!(failure.kind, FailureKind::UnknownContract);

            assert!(plan.run(&s, Some("missing"), false).await.is_err());
        });
    }
}
