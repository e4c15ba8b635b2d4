//! Dispatcher
//!
//! Executes a [`Plan`] against one request: for each descriptor, in plan
//! order, fetch the value from its source and write it into the field.
//! Stops at the first failure. Fields already written stay written.

use std::borrow::Cow;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::BindFailure;
use crate::jsonpath;
use crate::plan::{FieldDescriptor, Plan, Source};
use crate::record::{Record, Slot};
use crate::request::{BodyCodec, RequestView};

/// A value found in the request, in the shape its source produces.
#[derive(Debug)]
enum Found<'a> {
    Text(Cow<'a, [String]>),
    Json(&'a Value),
    Raw(&'a [u8]),
}

/// Populate `dest` from `req` following `plan`.
pub fn bind_fields<R: Record>(
    plan: &Plan,
    dest: &mut R,
    req: &RequestView<'_>,
) -> Result<(), BindFailure> {
    if plan.sources().reads_body() && req.codec() == BodyCodec::None && !req.raw_body().is_empty() {
        warn!(
            record = plan.type_name(),
            "request body has an unsupported content type; body fields fall back to query or stay unset"
        );
    }

    for descriptor in plan.descriptors() {
        bind_field(descriptor, dest, req).inspect_err(|failure| {
            debug!(
                record = plan.type_name(),
                field = descriptor.selector(),
                cause = %failure,
                "binding failed"
            );
        })?;
    }
    Ok(())
}

fn bind_field<R: Record>(
    descriptor: &FieldDescriptor,
    dest: &mut R,
    req: &RequestView<'_>,
) -> Result<(), BindFailure> {
    let Some(found) = fetch(descriptor, req)? else {
        if descriptor.required() {
            return Err(BindFailure::MissingRequired {
                selector: descriptor.selector().to_string(),
                origin: descriptor.source(),
                name: descriptor.name().to_string(),
            });
        }
        return Ok(());
    };

    let slot = dest
        .slot_mut(descriptor.index())
        .ok_or_else(|| BindFailure::NotSettable {
            selector: descriptor.selector().to_string(),
        })?;

    write(slot, found).map_err(|details| BindFailure::Conversion {
        selector: descriptor.selector().to_string(),
        origin: descriptor.source(),
        name: descriptor.name().to_string(),
        details,
    })
}

fn write(slot: &mut dyn Slot, found: Found<'_>) -> Result<(), String> {
    match found {
        Found::Text(values) => slot.set_text(&values),
        Found::Json(value) => slot.set_json(value),
        Found::Raw(bytes) => slot.set_raw(bytes),
    }
}

/// Look the field up in its source. `Ok(None)` means absent.
fn fetch<'a>(
    descriptor: &FieldDescriptor,
    req: &'a RequestView<'_>,
) -> Result<Option<Found<'a>>, BindFailure> {
    let name = descriptor.name();
    let found = match descriptor.source() {
        Source::Query => query(req, name),
        Source::Path => req
            .path(name)
            .map(|v| Found::Text(Cow::Owned(vec![v.to_string()]))),
        Source::Header => {
            let values = req.header(name);
            (!values.is_empty()).then(|| Found::Text(Cow::Owned(values)))
        }
        Source::Cookie => req.cookie(name).map(|v| Found::Text(Cow::Borrowed(v))),
        Source::Body => body(descriptor, req)?,
        Source::RawBody => {
            let raw = req.raw_body();
            (!raw.is_empty() || !descriptor.required()).then_some(Found::Raw(raw))
        }
        // Body first; a body that is missing the value or fails to decode
        // defers to the query string.
        Source::Auto => match body(descriptor, req) {
            Ok(Some(found)) => Some(found),
            Ok(None) | Err(BindFailure::MalformedBody { .. }) => query(req, name),
            Err(other) => return Err(other),
        },
    };
    Ok(found)
}

fn query<'a>(req: &'a RequestView<'_>, name: &str) -> Option<Found<'a>> {
    req.query(name).map(|v| Found::Text(Cow::Borrowed(v)))
}

fn body<'a>(
    descriptor: &FieldDescriptor,
    req: &'a RequestView<'_>,
) -> Result<Option<Found<'a>>, BindFailure> {
    match req.codec() {
        BodyCodec::None => Ok(None),
        BodyCodec::Form => Ok(req
            .form(descriptor.name())
            .map(|v| Found::Text(Cow::Borrowed(v)))),
        BodyCodec::Json => {
            let json = req.json().map_err(|details| BindFailure::MalformedBody {
                selector: descriptor.selector().to_string(),
                codec: BodyCodec::Json.as_str(),
                details,
            })?;
            Ok(json
                .and_then(|root| jsonpath::lookup(root, descriptor.body_path()))
                .filter(|value| !value.is_null())
                .map(Found::Json))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Level;
    use crate::plan;
    use http::Request;
    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Owner {
        name: String,
    }

    #[derive(Debug, Default, PartialEq)]
    struct Form {
        id: u32,
        page: Option<u32>,
        token: String,
        sid: String,
        title: String,
        note: String,
        owner: Owner,
        raw: Vec<u8>,
    }

    crate::bind_record!(Form {
        id => "path",
        page => "query",
        token => "header:'X-Token'",
        sid => "cookie",
        title => "body",
        note => "",
        owner => "",
        owner.name => "body",
        raw => "raw_body",
    });

    fn run(req: &Request<Vec<u8>>, params: &[(&str, &str)]) -> (Form, Result<(), BindFailure>) {
        let plan = plan::build_for::<Form>(Level::FirstAndTagged).unwrap();
        let view = RequestView::new(req, &params);
        let mut form = Form::default();
        let result = bind_fields(&plan, &mut form, &view);
        (form, result)
    }

    fn json_request(uri: &str, body: &str) -> Request<Vec<u8>> {
        Request::builder()
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-token", "abc")
            .header("cookie", "sid=s1")
            .body(body.as_bytes().to_vec())
            .unwrap()
    }

    #[test]
    fn binds_every_source() {
        let body = r#"{"title": "t", "note": "n", "owner": {"name": "ann"}}"#;
        let req = json_request("/x?page=3", body);
        let (form, result) = run(&req, &[("id", "9")]);
        result.unwrap();
        assert_eq!(
            form,
            Form {
                id: 9,
                page: Some(3),
                token: "abc".into(),
                sid: "s1".into(),
                title: "t".into(),
                note: "n".into(),
                owner: Owner { name: "ann".into() },
                raw: body.as_bytes().to_vec(),
            }
        );
    }

    #[test]
    fn auto_prefers_body_then_query() {
        let req = json_request("/x?note=from-query", r#"{"note": "from-body"}"#);
        let (form, _) = run(&req, &[]);
        assert_eq!(form.note, "from-body");

        let req = json_request("/x?note=from-query", r#"{"title": "t"}"#);
        let (form, _) = run(&req, &[]);
        assert_eq!(form.note, "from-query");
    }

    #[test]
    fn null_in_body_counts_as_absent() {
        let req = json_request("/x?note=q", r#"{"note": null}"#);
        let (form, _) = run(&req, &[]);
        assert_eq!(form.note, "q");
    }

    #[test]
    fn conversion_failure_names_field() {
        let req = json_request("/x", "{}");
        let (form, result) = run(&req, &[("id", "nine")]);
        let failure = result.unwrap_err();
        assert_eq!(failure.selector(), "id");
        assert!(failure.to_string().starts_with("BIND-021"));
        assert_eq!(form.id, 0);
    }

    #[test]
    fn malformed_json_fails_body_fields() {
        let req = json_request("/x?note=q", "{oops");
        let (form, result) = run(&req, &[]);
        let failure = result.unwrap_err();
        assert!(matches!(failure, BindFailure::MalformedBody { ref selector, .. } if selector == "title"));
        assert_eq!(form.token, "abc");
    }

    #[derive(Debug, Default)]
    struct AutoOnly {
        note: String,
    }

    crate::bind_record!(AutoOnly { note => "" });

    #[test]
    fn malformed_json_defers_auto_to_query() {
        let plan = plan::build_for::<AutoOnly>(Level::Any).unwrap();
        let req = json_request("/x?note=q", "{oops");
        let view = RequestView::new(&req, &());
        let mut dest = AutoOnly::default();
        bind_fields(&plan, &mut dest, &view).unwrap();
        assert_eq!(dest.note, "q");
    }

    #[test]
    fn form_bodies_feed_body_fields() {
        let plan = plan::build_for::<AutoOnly>(Level::Any).unwrap();
        let req = Request::builder()
            .uri("/x?note=q")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(b"note=posted".to_vec())
            .unwrap();
        let view = RequestView::new(&req, &());
        let mut dest = AutoOnly::default();
        bind_fields(&plan, &mut dest, &view).unwrap();
        assert_eq!(dest.note, "posted");
    }

    #[test]
    fn unsupported_codec_leaves_auto_to_query() {
        let plan = plan::build_for::<AutoOnly>(Level::Any).unwrap();
        let req = Request::builder()
            .uri("/x?note=q")
            .header("content-type", "text/plain")
            .body(b"note=ignored".to_vec())
            .unwrap();
        let view = RequestView::new(&req, &());
        let mut dest = AutoOnly::default();
        bind_fields(&plan, &mut dest, &view).unwrap();
        assert_eq!(dest.note, "q");
    }
}
