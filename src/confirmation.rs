use crate::context::{ConfirmationRequest, Identity, ToolContext};
use crate::db::{ensure_ready, DataStore};
use crate::errors::{AppError, AppResult};
use crate::policy::InputPolicy;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

const TOOL_NAME_KEY: &str = "toolName";
const CONFIRMED_KEY: &str = "confirmed";

/// A state-changing operation that must be approved by a human before it runs.
/// The arguments double as the confirmation payload.
#[async_trait]
pub trait Mutation: Serialize + DeserializeOwned + Send + Sync {
    const TOOL_NAME: &'static str;
    const HINT: &'static str;

    type Output: Send;

    fn validate(&self, policy: &InputPolicy) -> AppResult<()>;

    /// Extra display-only fields for the proposal payload.
    fn summary(&self) -> Map<String, Value> {
        Map::new()
    }

    async fn apply(&self, store: &dyn DataStore, identity: &Identity) -> AppResult<Self::Output>;
}

/// Where a gated call ended up.
#[derive(Debug)]
pub enum GateOutcome<M, O> {
    AwaitingConfirmation(ConfirmationRequest),
    Rejected(M),
    Committed { args: M, output: O },
}

/// What the gate decided before touching the store.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision<M> {
    Propose(ConfirmationRequest),
    Reject(M),
    Commit(M),
}

pub fn propose<M: Mutation>(args: &M) -> AppResult<ConfirmationRequest> {
    let mut payload = match serde_json::to_value(args)? {
        Value::Object(map) => map,
        other => {
            return Err(AppError::Internal(format!(
                "{} arguments serialized to a non-object: {}",
                M::TOOL_NAME,
                other
            )))
        }
    };
    payload.extend(args.summary());
    payload.insert(TOOL_NAME_KEY.to_string(), Value::String(M::TOOL_NAME.to_string()));
    payload.insert(CONFIRMED_KEY.to_string(), Value::Bool(false));
    Ok(ConfirmationRequest {
        tool_name: M::TOOL_NAME.to_string(),
        hint: M::HINT.to_string(),
        payload: Value::Object(payload),
    })
}

/// Hosts echo payload keys in either snake or camel case.
fn camel_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for ch in key.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Lays the (possibly edited) confirmation payload over the original arguments.
/// Keys the arguments do not know about are ignored.
pub fn overlay<M: Mutation>(args: &M, payload: &Value) -> AppResult<M> {
    let mut merged = match serde_json::to_value(args)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    if let Value::Object(edits) = payload {
        if let Some(tool_name) = edits
            .get(TOOL_NAME_KEY)
            .or_else(|| edits.get("tool_name"))
            .and_then(Value::as_str)
        {
            if tool_name != M::TOOL_NAME {
                return Err(AppError::InvalidInput(format!(
                    "confirmation is for '{}', not '{}'",
                    tool_name,
                    M::TOOL_NAME
                )));
            }
        }
        for (key, value) in edits {
            let key = camel_key(key);
            if key == TOOL_NAME_KEY || key == CONFIRMED_KEY || !merged.contains_key(&key) {
                continue;
            }
            merged.insert(key, value.clone());
        }
    }
    serde_json::from_value(Value::Object(merged)).map_err(|error| {
        AppError::InvalidInput(format!("confirmation payload for {} is invalid: {}", M::TOOL_NAME, error))
    })
}

/// Pure transition: no confirmation proposes, a declined one rejects the arguments as
/// given, an approved one commits the overlaid arguments.
pub fn decide<M: Mutation>(context: &ToolContext, args: M) -> AppResult<GateDecision<M>> {
    let Some(confirmation) = context.tool_confirmation() else {
        return Ok(GateDecision::Propose(propose(&args)?));
    };
    let declined_in_payload = confirmation.payload.get(CONFIRMED_KEY).and_then(Value::as_bool) == Some(false);
    if !confirmation.confirmed || declined_in_payload {
        return Ok(GateDecision::Reject(args));
    }
    Ok(GateDecision::Commit(overlay(&args, &confirmation.payload)?))
}

/// Runs `args` through the confirmation protocol. The mutation is applied at most once
/// per call and never retried.
pub async fn run_gated<M: Mutation>(
    context: &mut ToolContext,
    store: &dyn DataStore,
    policy: &InputPolicy,
    args: M,
) -> AppResult<GateOutcome<M, M::Output>> {
    let identity = context.identity()?;
    args.validate(policy)?;

    match decide(context, args)? {
        GateDecision::Propose(request) => {
            tracing::info!(
                tool = M::TOOL_NAME,
                user_id = %identity.user_id,
                "awaiting confirmation"
            );
            context.request_confirmation(request.clone());
            Ok(GateOutcome::AwaitingConfirmation(request))
        }
        GateDecision::Reject(args) => {
            tracing::info!(tool = M::TOOL_NAME, user_id = %identity.user_id, "confirmation declined");
            Ok(GateOutcome::Rejected(args))
        }
        GateDecision::Commit(args) => {
            args.validate(policy)?;
            ensure_ready(store)?;
            let output = args.apply(store, &identity).await?;
            tracing::info!(tool = M::TOOL_NAME, user_id = %identity.user_id, "mutation committed");
            Ok(GateOutcome::Committed { args, output })
        }
    }
}
