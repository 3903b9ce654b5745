#![allow(dead_code)]

pub mod socket_guard;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serves `body` at `path_str` with status 200.
pub async fn mount_file(server: &MockServer, path_str: &str, body: impl Into<Vec<u8>>) {
    Mock::given(method("GET"))
        .and(path(path_str))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.into()))
        .mount(server)
        .await;
}

/// Serves `html` at `path_str` as `text/html`.
pub async fn mount_html(server: &MockServer, path_str: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(path_str))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(html),
        )
        .mount(server)
        .await;
}

/// Answers `path_str` with `status` and an empty body.
pub async fn mount_status(server: &MockServer, path_str: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(path_str))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Deterministic non-repeating-ish payload of `len` bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
