use anyhow::anyhow;
pub use anyhow::Result;
use hitrack::guard::{Navigator, LOGIN_PATH};
use hitrack::ListParams;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::str::FromStr;

pub mod identifiers;
pub mod pretty;

pub use identifiers::*;

/// Represents a field given on the command line.
///
/// Sort of like HTTPie. Query parameters (and list filters) are `==`, JSON body values are `=`.
/// Body values are parsed as JSON if possible and kept as strings otherwise; only single-level
/// keys are supported. Keys may use Django-style lookups, eg `repository__name==nginx`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ArgField {
    Query(String, String),
    Body(String, Value),
}

impl FromStr for ArgField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lazy_static! {
            static ref FIELD_RE: Regex =
                Regex::new(r"^([a-zA-Z_][a-zA-Z0-9_]*)=(=)?(.*)$").unwrap();
        }
        let captures = FIELD_RE
            .captures(s)
            .ok_or_else(|| anyhow!("could not parse as a field assignment: {}", s))?;
        let key = captures[1].to_string();
        let raw = &captures[3];
        if captures.get(2).is_some() {
            return Ok(ArgField::Query(key, raw.trim_matches('"').to_string()));
        }
        let val = match Value::from_str(raw) {
            _ if raw.is_empty() => Value::Null,
            Ok(v) => v,
            Err(_) => Value::String(raw.to_string()),
        };
        Ok(ArgField::Body(key, val))
    }
}

/// Splits fields into query parameters and a JSON object body (`None` if there were no body
/// fields)
pub fn split_fields(fields: Vec<ArgField>) -> (Vec<(String, String)>, Option<Value>) {
    let mut query = Vec::new();
    let mut body = Map::new();
    for f in fields {
        match f {
            ArgField::Query(k, v) => query.push((k, v)),
            ArgField::Body(k, v) => {
                body.insert(k, v);
            }
        }
    }
    let body = if body.is_empty() {
        None
    } else {
        Some(Value::Object(body))
    };
    (query, body)
}

/// Builds list parameters from the common list flags plus `key==value` filters. Body fields
/// make no sense for a list and are rejected.
pub fn list_params(
    search: Option<String>,
    ordering: Option<Ordering>,
    page: Option<u64>,
    page_size: Option<u64>,
    fields: Vec<ArgField>,
) -> Result<ListParams> {
    let (filters, body) = split_fields(fields);
    if body.is_some() {
        return Err(anyhow!(
            "list filters use key==value; key=value is only for request bodies"
        ));
    }
    Ok(ListParams {
        page,
        page_size,
        search,
        ordering: ordering.map(|o| o.to_string()),
        filters,
    })
}

/// Terminal stand-in for page navigation: there is no page to show, so point the user at the
/// command that gets them there.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, path: &str) {
        if path == LOGIN_PATH {
            eprintln!("Not logged in. Run `hitrack login --username <name>` to sign in again.");
        } else {
            log::info!("navigation to {} has no terminal equivalent", path);
        }
    }
}

#[test]
fn test_argfield() {
    use serde_json::json;
    assert_eq!(
        ArgField::from_str("page_size=3").unwrap(),
        ArgField::Body("page_size".to_string(), json!(3)),
    );
    assert_eq!(
        ArgField::from_str("severity==HIGH").unwrap(),
        ArgField::Query("severity".to_string(), "HIGH".to_string()),
    );
    assert_eq!(
        ArgField::from_str("repository__name==\"team/api\"").unwrap(),
        ArgField::Query("repository__name".to_string(), "team/api".to_string())
    );
    assert_eq!(
        ArgField::from_str("registry_uuid=abc-def").unwrap(),
        ArgField::Body("registry_uuid".to_string(), json!("abc-def"))
    );
    assert_eq!(
        ArgField::from_str("enabled=").unwrap(),
        ArgField::Body("enabled".to_string(), Value::Null),
    );
    assert_eq!(
        ArgField::from_str("last==").unwrap(),
        ArgField::Query("last".to_string(), String::new()),
    );

    assert!(ArgField::from_str("severity").is_err());
    assert!(ArgField::from_str("").is_err());
    assert!(ArgField::from_str("9lives=1").is_err());
    assert!(ArgField::from_str("tags=[\"a\", \"b\"]").is_ok());
}

#[test]
fn test_split_fields() {
    use serde_json::json;
    let fields = vec![
        ArgField::from_str("ordering==-epss").unwrap(),
        ArgField::from_str("registry_uuid=r1").unwrap(),
        ArgField::from_str("severity==LOW").unwrap(),
    ];
    let (query, body) = split_fields(fields);
    assert_eq!(
        query,
        vec![
            ("ordering".to_string(), "-epss".to_string()),
            ("severity".to_string(), "LOW".to_string()),
        ]
    );
    assert_eq!(body, Some(json!({"registry_uuid": "r1"})));
    assert_eq!(split_fields(vec![]), (vec![], None));
}

#[test]
fn test_list_params() {
    let params = list_params(
        Some("openssl".to_string()),
        Some(Ordering::from_str("-epss").unwrap()),
        Some(2),
        None,
        vec![ArgField::from_str("severity==CRITICAL").unwrap()],
    )
    .unwrap();
    assert_eq!(params.ordering.as_deref(), Some("-epss"));
    assert_eq!(
        params.filters,
        vec![("severity".to_string(), "CRITICAL".to_string())]
    );
    let body_field = vec![ArgField::from_str("a=1").unwrap()];
    assert!(list_params(None, None, None, None, body_field).is_err());
}
