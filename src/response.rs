//! Response emitter.
//!
//! Builds the response header block and hands the body to the framing engine
//! as a [`Bytes`]. DATA frames are cut from that buffer, so the body is never
//! copied on its way to the socket.

use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, error};

use crate::error::ResponseError;
use crate::h2_codec::error_code;
use crate::hpack::H2Header;
use crate::request::Response;
use crate::server::{Server, StreamHandle};
use crate::status::StatusCode;

/// Fields the emitter always generates itself.
const GENERATED: [&str; 3] = ["server", "date", "content-length"];

impl Server {
    /// Send `response` on `stream` and flush it to the write queue.
    ///
    /// A status without a standard reason phrase is replaced by a 500
    /// problem response, and the call still reports
    /// [`ResponseError::UnmappedStatus`]. If the flush fails the session is
    /// closed.
    pub fn send_response(
        &mut self,
        stream: StreamHandle,
        response: &Response,
    ) -> Result<(), ResponseError> {
        // HTTP/2 has no protocol upgrade
        if !(100..600).contains(&response.status) || response.status == 101 {
            return Err(ResponseError::InvalidStatus(response.status));
        }
        let Some(status) = StatusCode::from_u16(response.status) else {
            error!(status = response.status, "No status string, answering 500 instead");
            let fallback = Response::problem(
                StatusCode::InternalServerError,
                &format!("status {} cannot be sent", response.status),
            );
            self.send_response(stream, &fallback)?;
            return Err(ResponseError::UnmappedStatus(response.status));
        };

        let (session, stream_id) = {
            let entry = self.streams.get(stream).ok_or(ResponseError::StaleStream)?;
            (entry.session(), entry.stream_id())
        };
        let headers = response_headers(&self.config.server_name, status, response);

        let entry = self
            .sessions
            .get_mut(session)
            .ok_or(ResponseError::StaleSession)?;
        let submitted = if status.is_informational() {
            entry.engine.submit_headers(stream_id, &headers, false)
        } else {
            entry
                .engine
                .submit_response(stream_id, &headers, response.body.clone())
        };
        if let Err(e) = &submitted {
            error!(stream_id, status = status.as_u16(), error = %e, "Response rejected");
            entry
                .engine
                .submit_rst_stream(stream_id, error_code::INTERNAL_ERROR);
        } else {
            debug!(
                stream_id,
                status = status.as_u16(),
                content_length = response.content_length(),
                "Response submitted"
            );
        }

        if let Err(e) = self.session_send(session) {
            error!(error = %e, "Flushing response failed, closing session");
            if self.sessions.contains(session) {
                self.close_session(session);
            }
            return Err(ResponseError::Flush(e));
        }
        submitted.map_err(ResponseError::from)
    }

    /// [`send_response`](Self::send_response) taking ownership. The response
    /// is released once its body has been sliced into the engine.
    pub fn send_and_free(
        &mut self,
        stream: StreamHandle,
        response: Response,
    ) -> Result<(), ResponseError> {
        self.send_response(stream, &response)
    }
}

/// `:status`, `server`, `date`, `content-length` when the body is not empty, then
/// the application's own fields.
fn response_headers(server_name: &str, status: StatusCode, response: &Response) -> Vec<H2Header> {
    let mut headers = Vec::with_capacity(4 + response.headers.len());
    headers.push(H2Header::new(":status", status.as_str()));
    headers.push(H2Header::new("server", server_name));
    headers.push(H2Header::new("date", http_date(OffsetDateTime::now_utc())));
    if let Some(body) = response.body.as_ref().filter(|body| !body.is_empty()) {
        headers.push(H2Header::new("content-length", body.len().to_string()));
    }
    headers.extend(
        response
            .headers
            .iter()
            .filter(|(name, _)| !name.starts_with(':') && !GENERATED.contains(name))
            .map(|(name, value)| H2Header::new(name, value)),
    );
    headers
}

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(now: OffsetDateTime) -> String {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    now.to_offset(time::UtcOffset::UTC)
        .format(format)
        .unwrap_or_default()
}
