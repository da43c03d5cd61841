//! Minimal response templating over the incoming request

use super::stubs::IncomingRequest;

/// Substitute `{{request.*}}` expressions in `template`.
///
/// Supported: `url`, `path`, `method`, `body`, `headers.NAME`, `query.NAME`.
/// Unknown expressions render empty; unterminated `{{` is left verbatim.
#[must_use]
pub fn render_template(template: &str, request: &IncomingRequest) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        out.push_str(&resolve(after[..end].trim(), request));
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

fn resolve(expression: &str, request: &IncomingRequest) -> String {
    let Some(field) = expression.strip_prefix("request.") else {
        return String::new();
    };

    match field {
        "url" => request.url.clone(),
        "path" => request.path().to_string(),
        "method" => request.method.clone(),
        "body" => String::from_utf8_lossy(&request.body).into_owned(),
        _ => {
            if let Some(name) = field.strip_prefix("headers.") {
                request.header(name).unwrap_or_default().to_string()
            } else if let Some(name) = field.strip_prefix("query.") {
                request.query_param(name).unwrap_or_default()
            } else {
                String::new()
            }
        }
    }
}
