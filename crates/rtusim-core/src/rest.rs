//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Point simulation and control-mapping engine."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Decoding of the host's `"<METHOD> <path>?<query>"` request lines.

use rtusim_logging::{rtu_debug, InstanceContext};
use strum::{Display, EnumString};
use url::Url;

use crate::control::ControlMapper;
use crate::errors::{Result, RtuError};
use crate::status::{self, NumericField, SetRequest};
use crate::store::PointStore;

pub const STATUS_ROUTE: &str = "/PyPortRtuSim/status";
pub const SET_ROUTE: &str = "/PyPortRtuSim/set";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

/// Decoded request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl RestRequest {
    pub fn parse(method_and_url: &str) -> Result<Self> {
        let (method, target) = method_and_url
            .trim()
            .split_once(char::is_whitespace)
            .ok_or_else(|| RtuError::bad_request(format!("malformed request line {method_and_url:?}")))?;
        let method: HttpMethod = method
            .parse()
            .map_err(|_| RtuError::bad_request(format!("only GET and POST are supported, got {method}")))?;

        let base = Url::parse("http://localhost/")
            .map_err(|err| RtuError::bad_request(err.to_string()))?;
        let url = base
            .join(target.trim())
            .map_err(|err| RtuError::bad_request(format!("bad request target {target:?}: {err}")))?;
        Ok(Self {
            method,
            path: url.path().to_owned(),
            query: url.query_pairs().into_owned().collect(),
        })
    }

    /// First value of a query parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.param(name)
            .ok_or_else(|| RtuError::bad_request(format!("missing query parameter {name}")))
    }
}

/// Serve one request and return the JSON response body.
pub fn respond(
    store: &mut PointStore,
    mapper: &ControlMapper,
    ctx: &InstanceContext,
    request: &RestRequest,
    body: &str,
) -> Result<String> {
    let path = request.path.trim_end_matches('/');
    let response = match request.method {
        HttpMethod::Get if path.ends_with(STATUS_ROUTE) => {
            let device_type = request.required("Type")?;
            let number = NumericField::Text(request.required("Number")?.to_owned())
                .to_device_number()?;
            rtu_debug!(context = ctx, "status request for {} {}", device_type, number);
            serde_json::to_string(&status::get_status(store, device_type, number)?)
        }
        HttpMethod::Post if path.ends_with(SET_ROUTE) => {
            rtu_debug!(context = ctx, "set request {} body {}", request.path, body);
            let set = SetRequest::from_json(body)?;
            serde_json::to_string(&status::set_status(store, mapper, ctx, &set)?)
        }
        method => {
            return Err(RtuError::bad_request(format!(
                "no route for {method} {}",
                request.path
            )))
        }
    };
    response.map_err(|err| RtuError::bad_request(format!("response encoding failed: {err}")))
}
