//! The fixed tool surface: one descriptor per operation, each declaring its
//! remote method and parameter contract. `tools/list` schemas and argument
//! validation are both derived from this table.

use serde_json::{Map, Value, json};

use crate::gateway::methods;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Integer,
    String,
}

impl ParamKind {
    fn json_type(self) -> &'static str {
        match self {
            ParamKind::Integer => "integer",
            ParamKind::String => "string",
        }
    }
}

/// What a parameter means to the remote query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRole {
    SiteId,
    Period,
    Date,
    Limit,
    RawMethodName,
    RawParamBlob,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDefault {
    Integer(i64),
    Str(&'static str),
}

impl ParamDefault {
    fn to_value(self) -> Value {
        match self {
            ParamDefault::Integer(v) => json!(v),
            ParamDefault::Str(v) => json!(v),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub role: ParamRole,
    pub required: bool,
    pub default: Option<ParamDefault>,
    pub allowed: Option<&'static [&'static str]>,
    pub description: &'static str,
}

impl ParamSpec {
    fn schema(&self) -> Value {
        let mut schema = json!({
            "type": self.kind.json_type(),
            "description": self.description,
        });
        if let Some(allowed) = self.allowed {
            schema["enum"] = json!(allowed);
        }
        if let Some(default) = self.default {
            schema["default"] = default.to_value();
        }
        schema
    }
}

pub const PERIODS: &[&str] = &["day", "week", "month", "year", "range"];

const SITE_ID: ParamSpec = ParamSpec {
    name: "site_id",
    kind: ParamKind::Integer,
    role: ParamRole::SiteId,
    required: true,
    default: None,
    allowed: None,
    description: "The ID of the Matomo site",
};

const PERIOD: ParamSpec = ParamSpec {
    name: "period",
    kind: ParamKind::String,
    role: ParamRole::Period,
    required: false,
    default: Some(ParamDefault::Str("day")),
    allowed: Some(PERIODS),
    description: "Time period: day, week, month, year, or range",
};

const DATE: ParamSpec = ParamSpec {
    name: "date",
    kind: ParamKind::String,
    role: ParamRole::Date,
    required: false,
    default: Some(ParamDefault::Str("today")),
    allowed: None,
    description: "Date or date range",
};

const DATE_WITH_EXAMPLES: ParamSpec = ParamSpec {
    description: "Date or date range (e.g., '2024-01-01', 'last30', 'today', '2024-01-01,2024-01-31')",
    ..DATE
};

const LIMIT: ParamSpec = ParamSpec {
    name: "limit",
    kind: ParamKind::Integer,
    role: ParamRole::Limit,
    required: false,
    default: Some(ParamDefault::Integer(10)),
    allowed: None,
    description: "Maximum number of results to return",
};

const METHOD: ParamSpec = ParamSpec {
    name: "method",
    kind: ParamKind::String,
    role: ParamRole::RawMethodName,
    required: true,
    default: None,
    allowed: None,
    description: "Matomo API method name (e.g., 'Actions.getPageTitles', 'Goals.get')",
};

const ADDITIONAL_PARAMS: ParamSpec = ParamSpec {
    name: "additional_params",
    kind: ParamKind::String,
    role: ParamRole::RawParamBlob,
    required: false,
    default: None,
    allowed: None,
    description: "Additional parameters as JSON string (e.g., '{\"segment\": \"browserName==Chrome\"}')",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SiteInfo,
    VisitsSummary,
    PageUrls,
    Countries,
    UserSettings,
    Browsers,
    Referrers,
    CustomReport,
}

#[derive(Debug)]
pub struct OperationDescriptor {
    pub operation: Operation,
    pub name: &'static str,
    /// `None` for the escape hatch, whose method comes from the caller.
    pub remote_method: Option<&'static str>,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

impl OperationDescriptor {
    pub fn param(&self, name: &str) -> Option<&'static ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// The parameter playing `role` in this operation, if it takes one.
    pub fn param_with_role(&self, role: ParamRole) -> Option<&'static ParamSpec> {
        self.params.iter().find(|p| p.role == role)
    }

    pub fn required(&self) -> impl Iterator<Item = &'static str> {
        self.params.iter().filter(|p| p.required).map(|p| p.name)
    }

    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.to_string(), p.schema()))
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": self.required().collect::<Vec<_>>(),
            "additionalProperties": false
        })
    }

    pub fn to_value(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema(),
        })
    }
}

static CATALOG: [OperationDescriptor; 8] = [
    OperationDescriptor {
        operation: Operation::SiteInfo,
        name: "get_site_info",
        remote_method: Some(methods::SITE_INFO),
        description: "Get information about a specific Matomo site including name, URLs, timezone, and creation date",
        params: &[SITE_ID],
    },
    OperationDescriptor {
        operation: Operation::VisitsSummary,
        name: "get_visits_summary",
        remote_method: Some(methods::VISITS_SUMMARY),
        description: "Get a summary of visits for a site including total visits, unique visitors, actions, bounce rate, and visit duration",
        params: &[SITE_ID, PERIOD, DATE_WITH_EXAMPLES],
    },
    OperationDescriptor {
        operation: Operation::PageUrls,
        name: "get_page_urls",
        remote_method: Some(methods::PAGE_URLS),
        description: "Get the most visited page URLs for a site with metrics like pageviews, unique pageviews, bounce rate, and time spent",
        params: &[SITE_ID, PERIOD, DATE, LIMIT],
    },
    OperationDescriptor {
        operation: Operation::Countries,
        name: "get_countries",
        remote_method: Some(methods::COUNTRIES),
        description: "Get visitor statistics by country including visits, actions, and conversion metrics",
        params: &[SITE_ID, PERIOD, DATE, LIMIT],
    },
    OperationDescriptor {
        operation: Operation::UserSettings,
        name: "get_user_settings",
        remote_method: Some(methods::DEVICE_TYPES),
        description: "Get visitor device type information (desktop, mobile, tablet) with usage statistics",
        params: &[SITE_ID, PERIOD, DATE],
    },
    OperationDescriptor {
        operation: Operation::Browsers,
        name: "get_browsers",
        remote_method: Some(methods::BROWSERS),
        description: "Get visitor browser statistics including browser name, version, and usage metrics",
        params: &[SITE_ID, PERIOD, DATE],
    },
    OperationDescriptor {
        operation: Operation::Referrers,
        name: "get_referrers",
        remote_method: Some(methods::REFERRERS),
        description: "Get referrer information showing where visitors came from (search engines, websites, social media, etc.)",
        params: &[SITE_ID, PERIOD, DATE, LIMIT],
    },
    OperationDescriptor {
        operation: Operation::CustomReport,
        name: "query_custom_report",
        remote_method: None,
        description: "Execute a custom Matomo API query for advanced reporting needs. Use this for any API method not covered by other tools.",
        params: &[METHOD, SITE_ID, PERIOD, DATE, ADDITIONAL_PARAMS],
    },
];

/// All operations, in menu order.
pub fn list_operations() -> &'static [OperationDescriptor] {
    &CATALOG
}

pub fn find_operation(name: &str) -> Option<&'static OperationDescriptor> {
    CATALOG.iter().find(|op| op.name == name)
}

pub fn tools_list_payload() -> Value {
    let tools: Vec<Value> = list_operations()
        .iter()
        .map(OperationDescriptor::to_value)
        .collect();
    json!({ "tools": tools })
}
