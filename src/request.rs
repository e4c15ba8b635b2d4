//! Request extractors
//!
//! [`RequestView`] wraps an `http::Request` for one dispatch. The body codec
//! is decided once from `Content-Type`; query values, form values, cookies
//! and the decoded JSON body are materialized on first use and at most once.

use std::collections::{BTreeMap, HashMap};

use http::header::{CONTENT_TYPE, COOKIE};
use http::{HeaderMap, Request};
use once_cell::unsync::OnceCell;
use serde_json::Value;

/// Decoded `name -> values` pairs, values in arrival order.
pub type Values = HashMap<String, Vec<String>>;

/// Path parameters captured by the router.
pub trait PathParams {
    fn get(&self, name: &str) -> Option<&str>;
}

impl PathParams for () {
    fn get(&self, _name: &str) -> Option<&str> {
        None
    }
}

impl PathParams for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<&str> {
        HashMap::get(self, name).map(String::as_str)
    }
}

impl PathParams for BTreeMap<String, String> {
    fn get(&self, name: &str) -> Option<&str> {
        BTreeMap::get(self, name).map(String::as_str)
    }
}

impl<K: AsRef<str>, V: AsRef<str>> PathParams for [(K, V)] {
    fn get(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_ref())
    }
}

impl<K: AsRef<str>, V: AsRef<str>, const N: usize> PathParams for [(K, V); N] {
    fn get(&self, name: &str) -> Option<&str> {
        PathParams::get(self.as_slice(), name)
    }
}

impl<K: AsRef<str>, V: AsRef<str>> PathParams for Vec<(K, V)> {
    fn get(&self, name: &str) -> Option<&str> {
        PathParams::get(self.as_slice(), name)
    }
}

impl<P: PathParams + ?Sized> PathParams for &P {
    fn get(&self, name: &str) -> Option<&str> {
        (**self).get(name)
    }
}

/// How the request body is decoded for `body` and auto fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyCodec {
    /// Unsupported or missing content type: body lookups find nothing.
    None,
    Json,
    Form,
}

impl BodyCodec {
    /// Media type match, case-insensitive, parameters ignored.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(value) = content_type else {
            return BodyCodec::None;
        };
        let media = value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match media.as_str() {
            "application/json" => BodyCodec::Json,
            "application/x-www-form-urlencoded" => BodyCodec::Form,
            m if m.ends_with("+json") => BodyCodec::Json,
            _ => BodyCodec::None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BodyCodec::None => "unsupported",
            BodyCodec::Json => "json",
            BodyCodec::Form => "form",
        }
    }
}

/// One request, as seen by the dispatcher.
pub struct RequestView<'r> {
    headers: &'r HeaderMap,
    raw_query: Option<&'r str>,
    body: &'r [u8],
    path_params: &'r dyn PathParams,
    codec: BodyCodec,
    query: OnceCell<Values>,
    form: OnceCell<Values>,
    cookies: OnceCell<Values>,
    json: OnceCell<Result<Option<Value>, String>>,
}

impl<'r> RequestView<'r> {
    pub fn new<B: AsRef<[u8]>>(req: &'r Request<B>, path_params: &'r dyn PathParams) -> Self {
        let codec = BodyCodec::from_content_type(
            req.headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );
        Self {
            headers: req.headers(),
            raw_query: req.uri().query(),
            body: req.body().as_ref(),
            path_params,
            codec,
            query: OnceCell::new(),
            form: OnceCell::new(),
            cookies: OnceCell::new(),
            json: OnceCell::new(),
        }
    }

    pub fn codec(&self) -> BodyCodec {
        self.codec
    }

    /// The body exactly as received.
    pub fn raw_body(&self) -> &'r [u8] {
        self.body
    }

    pub fn query(&self, name: &str) -> Option<&[String]> {
        self.query
            .get_or_init(|| decode_urlencoded(self.raw_query.unwrap_or_default().as_bytes()))
            .get(name)
            .map(Vec::as_slice)
    }

    pub fn path(&self, name: &str) -> Option<&str> {
        self.path_params.get(name)
    }

    /// Every value of header `name`, case-insensitive. Non-UTF-8 values are skipped.
    pub fn header(&self, name: &str) -> Vec<String> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    pub fn cookie(&self, name: &str) -> Option<&[String]> {
        self.cookies
            .get_or_init(|| parse_cookies(self.headers))
            .get(name)
            .map(Vec::as_slice)
    }

    /// Form field from a urlencoded body; `None` for any other codec.
    pub fn form(&self, name: &str) -> Option<&[String]> {
        if self.codec != BodyCodec::Form {
            return None;
        }
        self.form
            .get_or_init(|| decode_urlencoded(self.body))
            .get(name)
            .map(Vec::as_slice)
    }

    /// Decoded JSON body. `Ok(None)` when the codec is not JSON or the body
    /// is empty; `Err` carries the parser message.
    pub fn json(&self) -> Result<Option<&Value>, String> {
        if self.codec != BodyCodec::Json {
            return Ok(None);
        }
        self.json
            .get_or_init(|| {
                if self.body.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                serde_json::from_slice(self.body)
                    .map(Some)
                    .map_err(|e| e.to_string())
            })
            .as_ref()
            .map(Option::as_ref)
            .map_err(Clone::clone)
    }
}

fn decode_urlencoded(input: &[u8]) -> Values {
    let mut values = Values::new();
    for (key, value) in url::form_urlencoded::parse(input) {
        values
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    values
}

fn parse_cookies(headers: &HeaderMap) -> Values {
    let mut values = Values::new();
    let pairs = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| pair.split_once('='));
    for (name, value) in pairs {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        values
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }
    values
}
