//! Typed Rust client for the OpenNebula XML-RPC API.
//!
//! Covers the subset needed for managing machine VMs:
//! allocate, info, pool listing and VM actions.

mod template;
mod types;
mod xml;
mod xmlrpc;

pub use template::{Template, Vector, keys};
pub use types::*;

use xmlrpc::{Param, Value};

/// Pool filter flag selecting resources owned by the session user.
const POOL_WHO_MINE: i32 = -3;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("opennebula request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("opennebula {method} returned {status}: {body}")]
    Http {
        method: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("opennebula xml-rpc fault {code}: {message}")]
    Fault { code: i64, message: String },

    #[error("OpenNebula error [{code}]: {message}")]
    Api {
        method: &'static str,
        code: ResponseCode,
        message: String,
    },

    #[error("invalid opennebula response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for an OpenNebula front-end (`oned`) XML-RPC endpoint.
#[derive(Clone)]
pub struct OneClient {
    session: String,
    endpoint: String,
    http: reqwest::Client,
}

impl OneClient {
    /// `endpoint` is the full RPC URL, e.g. `http://one.example.com:2633/RPC2`.
    pub fn new(
        username: impl AsRef<str>,
        password: impl AsRef<str>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            session: format!("{}:{}", username.as_ref(), password.as_ref()),
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
        }
    }

    async fn check(resp: reqwest::Response, method: &'static str) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Http { method, status, body });
        }
        Ok(resp)
    }

    /// Issue `method` with the session prepended and unwrap OpenNebula's
    /// `[success, result, error_code, ...]` response array.
    async fn call(&self, method: &'static str, params: &[Param<'_>]) -> Result<Value> {
        let mut args = Vec::with_capacity(params.len() + 1);
        args.push(Param::Str(&self.session));
        args.extend_from_slice(params);

        tracing::debug!(method, endpoint = %self.endpoint, "opennebula: xml-rpc call");

        let resp = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(xmlrpc::encode_call(method, &args))
            .send()
            .await?;

        let body = Self::check(resp, method).await?.text().await?;
        unpack(method, xmlrpc::decode_response(&body)?)
    }

    // ── Virtual machines ─────────────────────────────────────────────

    /// Allocate a VM from template text and return its ID. With `hold`
    /// the VM is created in the HOLD state and not scheduled.
    pub async fn allocate_vm(&self, template: &str, hold: bool) -> Result<i32> {
        let value = self
            .call("one.vm.allocate", &[Param::Str(template), Param::Bool(hold)])
            .await?;
        as_id("one.vm.allocate", &value)
    }

    pub async fn vm_info(&self, id: i32) -> Result<Vm> {
        let value = self
            .call("one.vm.info", &[Param::Int(id), Param::Bool(false)])
            .await?;
        Vm::from_xml(as_document("one.vm.info", &value)?)
    }

    /// List the session user's VMs in any state but DONE.
    pub async fn vm_pool_info(&self) -> Result<VmPool> {
        let value = self
            .call(
                "one.vmpool.info",
                &[
                    Param::Int(POOL_WHO_MINE),
                    Param::Int(-1),
                    Param::Int(-1),
                    Param::Int(-1),
                ],
            )
            .await?;
        VmPool::from_xml(as_document("one.vmpool.info", &value)?)
    }

    pub async fn vm_action(&self, action: VmAction, id: i32) -> Result<()> {
        self.call("one.vm.action", &[Param::Str(action.as_str()), Param::Int(id)])
            .await?;
        Ok(())
    }
}

fn unpack(method: &'static str, value: Value) -> Result<Value> {
    let Value::Array(mut items) = value else {
        return Err(Error::Decode(format!("{method}: expected a response array")));
    };

    let success = items
        .first()
        .and_then(Value::as_bool)
        .ok_or_else(|| Error::Decode(format!("{method}: missing success flag")))?;

    if items.len() < 2 {
        return Err(Error::Decode(format!("{method}: missing result value")));
    }

    if success {
        return Ok(items.swap_remove(1));
    }

    Err(Error::Api {
        method,
        code: ResponseCode::from_code(items.get(2).and_then(Value::as_i64).unwrap_or(-1)),
        message: items[1].as_str().unwrap_or_default().to_string(),
    })
}

fn as_id(method: &'static str, value: &Value) -> Result<i32> {
    value
        .as_i64()
        .and_then(|id| i32::try_from(id).ok())
        .ok_or_else(|| Error::Decode(format!("{method}: expected an integer id")))
}

fn as_document<'a>(method: &'static str, value: &'a Value) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| Error::Decode(format!("{method}: expected an xml document")))
}
