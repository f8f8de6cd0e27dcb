//! Legacy HTTP POST path, used only for the initiator's candidate-removal
//! batches.

use log::debug;
use serde::Deserialize;

use crate::error::SignalingError;

#[derive(Debug, Deserialize)]
struct PostResponse {
    result: String,
}

/// Posts `body` to the room server's message URL and checks the `result`
/// field of the JSON response. `ureq` is blocking, so the request runs on
/// the blocking thread pool.
pub async fn post_signaling_message(url: &str, body: String) -> Result<(), SignalingError> {
    debug!(target: "Room/Http", "POST {url}: {body}");
    let url = url.to_string();
    let response_body = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, SignalingError> {
        let response = ureq::post(&url)
            .header("Content-Type", "application/json")
            .send(body.as_bytes())?;
        let mut body = response.into_body();
        Ok(body.read_to_vec()?)
    })
    .await??;
    check_post_response(&response_body)
}

fn check_post_response(body: &[u8]) -> Result<(), SignalingError> {
    let response: PostResponse = serde_json::from_slice(body)?;
    if response.result == "SUCCESS" {
        Ok(())
    } else {
        Err(SignalingError::PostRejected(response.result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_result_is_accepted() {
        assert!(check_post_response(br#"{"result":"SUCCESS"}"#).is_ok());
    }

    #[test]
    fn other_results_are_rejected() {
        assert!(matches!(
            check_post_response(br#"{"result":"FULL"}"#),
            Err(SignalingError::PostRejected(result)) if result == "FULL"
        ));
    }

    #[test]
    fn malformed_response_is_an_error() {
        assert!(matches!(
            check_post_response(b"<html>"),
            Err(SignalingError::PostJson(_))
        ));
    }
}
