use serde_json::json;

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!(
        "{}",
        serde_json::to_string_pretty(&err).unwrap_or_else(|_| err.to_string())
    );
    std::process::exit(4);
}

/// Operator token from `--token` / `CHECKIN_DISPATCH_TOKEN`, or exit with a usage error.
pub fn require_token(token: Option<&str>) -> &str {
    match token {
        Some(t) if !t.trim().is_empty() => t,
        _ => exit_error(
            "An operator token is required for this command",
            Some("Pass --token or set CHECKIN_DISPATCH_TOKEN."),
        ),
    }
}

/// Wrap a response body for printing. Bodiless replies (204) become a status object.
pub fn response_body(status: u16, text: &str) -> serde_json::Value {
    if text.trim().is_empty() {
        return json!({ "status": status });
    }
    serde_json::from_str(text)
        .unwrap_or_else(|e| json!({"raw_error": format!("Failed to parse response as JSON: {e}")}))
}

/// Execute an API request, print the response, and return a structured exit code.
///
/// Exit codes: 0=success (2xx), 1=client error (4xx), 2=server error (5xx),
///             3=connection error, 4=usage error
pub async fn api_request(
    api_url: &str,
    method: reqwest::Method,
    path: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
    query: &[(String, String)],
) -> i32 {
    let url = match reqwest::Url::parse(&format!("{}{path}", api_url.trim_end_matches('/'))) {
        Ok(mut u) => {
            if !query.is_empty() {
                let mut q = u.query_pairs_mut();
                for (k, v) in query {
                    q.append_pair(k, v);
                }
            }
            u
        }
        Err(e) => exit_error(&format!("Invalid URL: {api_url}{path}: {e}"), None),
    };

    let mut req = client().request(method, url);
    if let Some(t) = token {
        req = req.bearer_auth(t);
    }
    if let Some(b) = body {
        req = req.json(&b);
    }

    let resp = match req.send().await {
        Ok(r) => r,
        Err(e) => {
            let err = json!({
                "error": "connection_error",
                "message": format!("{e}"),
                "docs_hint": "Is the API server running? Check CHECKIN_API_URL."
            });
            eprintln!("{err:#}");
            return 3;
        }
    };

    let status = resp.status().as_u16();
    let exit_code = match status {
        200..=299 => 0,
        400..=499 => 1,
        _ => 2,
    };

    let text = resp.text().await.unwrap_or_default();
    let output = response_body(status, &text);

    if exit_code == 0 {
        println!("{output:#}");
    } else {
        eprintln!("{output:#}");
    }

    exit_code
}
