use std::sync::Arc;

use matomo_core::endpoint::EndpointConfig;
use matomo_core::error::ToolError;
use matomo_core::outcome::ToolOutcome;
use matomo_core::query::Period;
use serde_json::{Map, Value};
use tracing::Instrument;
use uuid::Uuid;

use crate::catalog::{
    Operation, OperationDescriptor, ParamDefault, ParamRole, ParamSpec, find_operation,
    list_operations,
};
use crate::gateway::{HttpTransport, MatomoClient, Transport, report_query};

/// Shared `{idSite, period, date}` arguments of the periodic reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArgs {
    pub site_id: i64,
    pub period: Period,
    pub date: String,
}

/// A tool invocation whose arguments have been checked against the
/// operation's schema and completed with defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    SiteInfo {
        site_id: i64,
    },
    VisitsSummary(ReportArgs),
    PageUrls {
        report: ReportArgs,
        limit: i64,
    },
    Countries {
        report: ReportArgs,
        limit: i64,
    },
    UserSettings(ReportArgs),
    Browsers(ReportArgs),
    Referrers {
        report: ReportArgs,
        limit: i64,
    },
    CustomReport {
        method: String,
        report: ReportArgs,
        /// One entry per key; several values go out as repeated keys.
        additional: Vec<(String, Vec<String>)>,
    },
}

impl ToolCall {
    pub fn parse(name: &str, args: &Map<String, Value>) -> Result<Self, ToolError> {
        let descriptor =
            find_operation(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let args = ArgReader::new(descriptor, args)?;

        Ok(match descriptor.operation {
            Operation::SiteInfo => ToolCall::SiteInfo {
                site_id: args.integer(ParamRole::SiteId)?,
            },
            Operation::VisitsSummary => ToolCall::VisitsSummary(args.report()?),
            Operation::PageUrls => ToolCall::PageUrls {
                report: args.report()?,
                limit: args.integer(ParamRole::Limit)?,
            },
            Operation::Countries => ToolCall::Countries {
                report: args.report()?,
                limit: args.integer(ParamRole::Limit)?,
            },
            Operation::UserSettings => ToolCall::UserSettings(args.report()?),
            Operation::Browsers => ToolCall::Browsers(args.report()?),
            Operation::Referrers => ToolCall::Referrers {
                report: args.report()?,
                limit: args.integer(ParamRole::Limit)?,
            },
            Operation::CustomReport => {
                let method = args.string(ParamRole::RawMethodName)?;
                let report = args.report()?;
                let additional = match args.optional_string(ParamRole::RawParamBlob)? {
                    Some(raw) => parse_additional_params(&raw)?,
                    None => Vec::new(),
                };
                ToolCall::CustomReport {
                    method,
                    report,
                    additional,
                }
            }
        })
    }

    async fn execute(self, client: &MatomoClient) -> Result<Value, ToolError> {
        match self {
            ToolCall::SiteInfo { site_id } => client.get_site_info(site_id).await,
            ToolCall::VisitsSummary(r) => {
                client
                    .get_visits_summary(r.site_id, r.period, &r.date)
                    .await
            }
            ToolCall::PageUrls { report: r, limit } => {
                client
                    .get_page_urls(r.site_id, r.period, &r.date, limit)
                    .await
            }
            ToolCall::Countries { report: r, limit } => {
                client
                    .get_countries(r.site_id, r.period, &r.date, limit)
                    .await
            }
            ToolCall::UserSettings(r) => {
                client
                    .get_user_settings(r.site_id, r.period, &r.date)
                    .await
            }
            ToolCall::Browsers(r) => client.get_browsers(r.site_id, r.period, &r.date).await,
            ToolCall::Referrers { report: r, limit } => {
                client
                    .get_referrers(r.site_id, r.period, &r.date, limit)
                    .await
            }
            ToolCall::CustomReport {
                method,
                report: r,
                additional,
            } => {
                let mut query = report_query(&method, r.site_id, r.period, &r.date);
                for (key, values) in additional {
                    query.set_many(key, values);
                }
                client.call(&query).await
            }
        }
    }
}

/// Resolves tool names against the catalog and runs them against Matomo.
///
/// The endpoint is resolved once up front; if that failed, every invocation
/// reports the configuration error before its arguments are looked at.
pub struct Dispatcher {
    client: Result<MatomoClient, ToolError>,
}

impl Dispatcher {
    pub fn new(endpoint: Result<EndpointConfig, ToolError>, transport: Arc<dyn Transport>) -> Self {
        Self {
            client: endpoint.map(|endpoint| MatomoClient::new(endpoint, transport)),
        }
    }

    pub fn from_endpoint(endpoint: Result<EndpointConfig, ToolError>) -> Self {
        let client = endpoint.and_then(|endpoint| {
            let transport = HttpTransport::new()?;
            Ok(MatomoClient::new(endpoint, Arc::new(transport)))
        });
        Self { client }
    }

    pub fn list_operations(&self) -> &'static [OperationDescriptor] {
        list_operations()
    }

    /// Configuration problem that will fail every call, if any.
    pub fn configuration_error(&self) -> Option<&ToolError> {
        self.client.as_ref().err()
    }

    pub async fn invoke(&self, name: &str, args: &Map<String, Value>) -> ToolOutcome {
        let call_id = Uuid::now_v7();
        let span = tracing::info_span!("tool_call", tool = name, %call_id);
        async {
            let result = self.try_invoke(name, args).await;
            match &result {
                Ok(_) => tracing::info!("tool call succeeded"),
                Err(err) => tracing::error!(code = err.code(), error = %err, "tool call failed"),
            }
            ToolOutcome::from(result)
        }
        .instrument(span)
        .await
    }

    async fn try_invoke(&self, name: &str, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let client = self.client.as_ref().map_err(Clone::clone)?;
        let call = ToolCall::parse(name, args)?;
        call.execute(client).await
    }
}

struct ArgReader<'a> {
    descriptor: &'static OperationDescriptor,
    args: &'a Map<String, Value>,
}

impl<'a> ArgReader<'a> {
    fn new(
        descriptor: &'static OperationDescriptor,
        args: &'a Map<String, Value>,
    ) -> Result<Self, ToolError> {
        if let Some(unknown) = args.keys().find(|k| descriptor.param(k).is_none()) {
            return Err(ToolError::validation(
                unknown.as_str(),
                format!("Unknown field '{unknown}' for tool '{}'", descriptor.name),
            ));
        }
        Ok(Self { descriptor, args })
    }

    fn spec(&self, role: ParamRole) -> Result<&'static ParamSpec, ToolError> {
        self.descriptor
            .param_with_role(role)
            .ok_or_else(|| ToolError::Validation {
                message: format!("Tool '{}' takes no {role:?} parameter", self.descriptor.name),
                field: None,
            })
    }

    fn present(&self, spec: &ParamSpec) -> Option<&'a Value> {
        self.args.get(spec.name).filter(|v| !v.is_null())
    }

    fn report(&self) -> Result<ReportArgs, ToolError> {
        let period = self.string(ParamRole::Period)?;
        Ok(ReportArgs {
            site_id: self.integer(ParamRole::SiteId)?,
            period: period
                .parse::<Period>()
                .map_err(|message: String| ToolError::validation("period", message))?,
            date: self.string(ParamRole::Date)?,
        })
    }

    fn integer(&self, role: ParamRole) -> Result<i64, ToolError> {
        let spec = self.spec(role)?;
        let key = spec.name;
        let invalid = || ToolError::validation(key, format!("'{key}' must be an integer"));
        match self.present(spec) {
            None => match spec.default {
                Some(ParamDefault::Integer(v)) if !spec.required => Ok(v),
                _ => Err(ToolError::missing_field(key)),
            },
            Some(Value::Number(n)) => n.as_i64().ok_or_else(invalid),
            Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| invalid()),
            Some(_) => Err(invalid()),
        }
    }

    fn string(&self, role: ParamRole) -> Result<String, ToolError> {
        let spec = self.spec(role)?;
        let key = spec.name;
        let value = match self.present(spec) {
            None => match spec.default {
                Some(ParamDefault::Str(v)) if !spec.required => return Ok(v.to_string()),
                _ => return Err(ToolError::missing_field(key)),
            },
            Some(Value::String(v)) => v.clone(),
            Some(_) => {
                return Err(ToolError::validation(
                    key,
                    format!("'{key}' must be a string"),
                ));
            }
        };
        match spec.allowed {
            Some(allowed) if !allowed.contains(&value.as_str()) => Err(ToolError::validation(
                key,
                format!("'{key}' must be one of: {}", allowed.join(", ")),
            )),
            _ => Ok(value),
        }
    }

    fn optional_string(&self, role: ParamRole) -> Result<Option<String>, ToolError> {
        let spec = self.spec(role)?;
        match self.present(spec) {
            None => Ok(None),
            Some(Value::String(v)) => Ok(Some(v.clone())),
            Some(_) => Err(ToolError::validation(
                spec.name,
                format!("'{}' must be a string", spec.name),
            )),
        }
    }
}

fn parse_additional_params(raw: &str) -> Result<Vec<(String, Vec<String>)>, ToolError> {
    let parsed: Value = serde_json::from_str(raw).map_err(|e| {
        ToolError::validation(
            "additional_params",
            format!("'additional_params' is not valid JSON: {e}"),
        )
    })?;
    let Value::Object(map) = parsed else {
        return Err(ToolError::validation(
            "additional_params",
            "'additional_params' must be a JSON object",
        ));
    };

    let mut out = Vec::with_capacity(map.len());
    for (key, value) in map {
        let values = match value {
            Value::Null => continue,
            Value::Array(items) => items
                .iter()
                .map(|item| scalar_to_string(item, "additional_params"))
                .collect::<Result<Vec<_>, _>>()?,
            other => vec![scalar_to_string(&other, "additional_params")?],
        };
        out.push((key, values));
    }
    Ok(out)
}

fn scalar_to_string(value: &Value, field: &str) -> Result<String, ToolError> {
    match value {
        Value::String(v) => Ok(v.clone()),
        Value::Number(v) => Ok(v.to_string()),
        Value::Bool(v) => Ok(v.to_string()),
        _ => Err(ToolError::validation(
            field,
            format!("'{field}' values must be scalars (string/number/bool) or arrays of scalars"),
        )),
    }
}
