use std::fmt;
use std::str::FromStr;

/// Query keys owned by the gateway. Caller-supplied values for these are
/// never sent.
pub const RESERVED_KEYS: [&str; 4] = ["module", "method", "format", "token_auth"];

pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Matomo reporting period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Period {
    #[default]
    Day,
    Week,
    Month,
    Year,
    Range,
}

impl Period {
    pub const ALL: [Period; 5] = [
        Period::Day,
        Period::Week,
        Period::Month,
        Period::Year,
        Period::Range,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
            Period::Range => "range",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Period::ALL
            .into_iter()
            .find(|p| p.as_str() == raw)
            .ok_or_else(|| {
                format!("period must be one of: day, week, month, year, range (got '{raw}')")
            })
    }
}

/// One Matomo API call: the remote method plus its operation-specific
/// parameters, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteQuery {
    pub method: String,
    params: Vec<(String, String)>,
}

impl RemoteQuery {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: Vec::new(),
        }
    }

    /// Set `key`, replacing earlier values in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.set_many(key, [value]);
    }

    /// Set `key` to several values, sent as repeated query keys. Earlier
    /// values are replaced at the position of the first one; an empty
    /// `values` removes the key.
    pub fn set_many<I, V>(&mut self, key: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        let key = key.into();
        let at = self
            .params
            .iter()
            .position(|(k, _)| *k == key)
            .unwrap_or(self.params.len());
        self.params.retain(|(k, _)| *k != key);
        let replacement: Vec<(String, String)> = values
            .into_iter()
            .map(|v| (key.clone(), v.to_string()))
            .collect();
        self.params.splice(at..at, replacement);
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Parameters that collide with [`RESERVED_KEYS`] and will be dropped.
    pub fn shadowed_reserved_keys(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .map(|(k, _)| k.as_str())
            .filter(|k| is_reserved_key(k))
    }

    /// The full query string pairs: reserved keys first, then every
    /// non-reserved parameter in insertion order.
    pub fn to_pairs(&self, token_auth: &str) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.params.len() + RESERVED_KEYS.len());
        pairs.push(("module".to_string(), "API".to_string()));
        pairs.push(("method".to_string(), self.method.clone()));
        pairs.push(("format".to_string(), "JSON".to_string()));
        pairs.push(("token_auth".to_string(), token_auth.to_string()));
        pairs.extend(
            self.params
                .iter()
                .filter(|(k, _)| !is_reserved_key(k))
                .cloned(),
        );
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(String, String)], key: &str) -> Vec<String> {
        pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    #[test]
    fn period_parses_only_known_values() {
        assert_eq!("week".parse::<Period>(), Ok(Period::Week));
        assert_eq!(Period::default().as_str(), "day");
        let err = "quarter".parse::<Period>().unwrap_err();
        assert!(err.contains("quarter"));
        assert!("Day".parse::<Period>().is_err());
    }

    #[test]
    fn set_overwrites_in_place() {
        let query = RemoteQuery::new("VisitsSummary.get")
            .with("idSite", 1)
            .with("period", "day")
            .with("date", "today")
            .with("period", "month");
        assert_eq!(query.get("period"), Some("month"));
        assert_eq!(
            query.params(),
            &[
                ("idSite".to_string(), "1".to_string()),
                ("period".to_string(), "month".to_string()),
                ("date".to_string(), "today".to_string()),
            ]
        );
    }

    #[test]
    fn set_many_repeats_key_at_first_position() {
        let mut query = RemoteQuery::new("Goals.get")
            .with("idSite", 1)
            .with("idGoal", 9)
            .with("date", "today");
        query.set_many("idGoal", [1, 2]);
        assert_eq!(values(query.params(), "idGoal"), vec!["1", "2"]);
        assert_eq!(query.params()[1].0, "idGoal");
        assert_eq!(query.params()[3].0, "date");

        query.set("idGoal", 3);
        assert_eq!(values(query.params(), "idGoal"), vec!["3"]);

        query.set_many("idGoal", Vec::<String>::new());
        assert_eq!(query.get("idGoal"), None);
        assert_eq!(query.params().len(), 2);
    }

    #[test]
    fn reserved_keys_are_authoritative() {
        let query = RemoteQuery::new("Goals.get")
            .with("idSite", 2)
            .with("format", "XML")
            .with("token_auth", "stolen")
            .with("method", "UsersManager.deleteUser");

        let shadowed: Vec<&str> = query.shadowed_reserved_keys().collect();
        assert_eq!(shadowed, vec!["format", "token_auth", "method"]);

        let pairs = query.to_pairs("real_token");
        let lookup = |key: &str| values(&pairs, key);
        assert_eq!(lookup("module"), vec!["API"]);
        assert_eq!(lookup("method"), vec!["Goals.get"]);
        assert_eq!(lookup("format"), vec!["JSON"]);
        assert_eq!(lookup("token_auth"), vec!["real_token"]);
        assert_eq!(lookup("idSite"), vec!["2"]);
        assert_eq!(pairs.len(), 5);
    }
}
