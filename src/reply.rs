//! Canned replies emitted for every recognised purge or management request.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PurgeReply {
    Ok,
    BadRequest,
    NotFound,
    ServerError,
}

impl PurgeReply {
    pub fn status(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::ServerError => 500,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad request",
            Self::NotFound => "Not Found",
            Self::ServerError => "Server Error",
        }
    }

    pub fn body(self) -> &'static str {
        match self {
            Self::Ok => "OK\n",
            Self::BadRequest => "Bad request\n",
            Self::NotFound => "Not Found\n",
            Self::ServerError => "Server Error\n",
        }
    }

    /// Headers shared by every canned reply.
    pub fn headers() -> [(&'static str, &'static str); 3] {
        [
            ("cache-control", "no-cache"),
            ("connection", "close"),
            ("content-type", "text/plain"),
        ]
    }

    /// Raw HTTP/1.0 rendering, for callers that write straight to a socket.
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Ok => RAW_200,
            Self::BadRequest => RAW_400,
            Self::NotFound => RAW_404,
            Self::ServerError => RAW_500,
        }
        .as_bytes()
    }
}

const RAW_200: &str = "HTTP/1.0 200 OK\r\n\
Cache-Control: no-cache\r\n\
Connection: close\r\n\
Content-Type: text/plain\r\n\
\r\n\
OK\n";

const RAW_400: &str = "HTTP/1.0 400 Bad request\r\n\
Cache-Control: no-cache\r\n\
Connection: close\r\n\
Content-Type: text/plain\r\n\
\r\n\
Bad request\n";

const RAW_404: &str = "HTTP/1.0 404 Not Found\r\n\
Cache-Control: no-cache\r\n\
Connection: close\r\n\
Content-Type: text/plain\r\n\
\r\n\
Not Found\n";

const RAW_500: &str = "HTTP/1.0 500 Server Error\r\n\
Cache-Control: no-cache\r\n\
Connection: close\r\n\
Content-Type: text/plain\r\n\
\r\n\
Server Error\n";

#[cfg(feature = "http")]
impl axum::response::IntoResponse for PurgeReply {
    fn into_response(self) -> axum::response::Response {
        let status = axum::http::StatusCode::from_u16(self.status())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        (status, Self::headers(), self.body()).into_response()
    }
}
