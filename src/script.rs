//! JSON scripts of signed calls.
//!
//! A script is an array of `{ "signer": NAME, "call": CALL }` steps. Inside a
//! call any string starting with `@` names an account: `@bank` and `@token`
//! resolve to the bank and its configured token, any other `@name` to the
//! development identity of that name.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use multibank_core::identity::{dev_address, Identity};
use multibank_core::{Call, Chain, Receipt};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    pub signer: String,
    pub call: Value,
}

pub fn load(path: &Path) -> Result<Vec<Step>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("malformed script {}", path.display()))
}

/// Replace `@name` references in `call` and decode it.
pub fn resolve(chain: &Chain, call: &Value) -> Result<Call> {
    let mut call = call.clone();
    substitute(chain, &mut call)?;
    serde_json::from_value(call).context("unrecognised call")
}

fn substitute(chain: &Chain, value: &mut Value) -> Result<()> {
    match value {
        Value::String(text) => {
            if let Some(name) = text.strip_prefix('@') {
                let address = match name {
                    "bank" => chain.bank_address(),
                    "token" => chain
                        .bank()
                        .bank_token()
                        .ok_or_else(|| anyhow!("@token used before a bank token is set"))?,
                    "" => bail!("empty account reference"),
                    name => dev_address(name),
                };
                *text = address.to_string();
            }
        }
        Value::Array(items) => {
            for item in items {
                substitute(chain, item)?;
            }
        }
        Value::Object(fields) => {
            for (_, field) in fields.iter_mut() {
                substitute(chain, field)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Submit every step in order. Reverted calls are recorded and the run goes
/// on; a step that cannot be decoded or verified stops it.
pub fn run(chain: &mut Chain, steps: &[Step]) -> Result<Vec<Receipt>> {
    let mut receipts = Vec::with_capacity(steps.len());
    for (index, step) in steps.iter().enumerate() {
        let call = resolve(chain, &step.call).with_context(|| format!("step {index}"))?;
        let signer = Identity::dev(&step.signer);
        debug!(index, signer = %step.signer, "submitting step");
        let receipt = chain
            .submit_call(&signer, call)
            .with_context(|| format!("step {index} rejected"))?;
        receipts.push(receipt);
    }
    Ok(receipts)
}
