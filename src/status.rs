//! Response status codes the emitter knows how to put on the wire.

use std::fmt;

macro_rules! status_codes {
    ($( $(#[$doc:meta])* ($code:literal, $name:ident, $text:literal); )+) => {
        /// Closed set of standard HTTP status codes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum StatusCode {
            $( $(#[$doc])* $name = $code, )+
        }

        impl StatusCode {
            /// Every supported code, in ascending order.
            pub const ALL: &'static [StatusCode] = &[$(StatusCode::$name,)+];

            pub fn from_u16(code: u16) -> Option<Self> {
                match code {
                    $( $code => Some(StatusCode::$name), )+
                    _ => None,
                }
            }

            /// The three-digit form carried in `:status`.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( StatusCode::$name => stringify!($code), )+
                }
            }

            pub fn reason(&self) -> &'static str {
                match self {
                    $( StatusCode::$name => $text, )+
                }
            }
        }
    };
}

status_codes! {
    (100, Continue, "Continue");
    (200, Ok, "OK");
    (201, Created, "Created");
    (202, Accepted, "Accepted");
    (203, NonAuthoritativeInformation, "Non-Authoritative Information");
    (204, NoContent, "No Content");
    (205, ResetContent, "Reset Content");
    (206, PartialContent, "Partial Content");
    (300, MultipleChoices, "Multiple Choices");
    (301, MovedPermanently, "Moved Permanently");
    (302, Found, "Found");
    (303, SeeOther, "See Other");
    (304, NotModified, "Not Modified");
    (305, UseProxy, "Use Proxy");
    /// Reserved, unused since RFC 7231.
    (306, SwitchProxy, "Switch Proxy");
    (307, TemporaryRedirect, "Temporary Redirect");
    (308, PermanentRedirect, "Permanent Redirect");
    (400, BadRequest, "Bad Request");
    (401, Unauthorized, "Unauthorized");
    (402, PaymentRequired, "Payment Required");
    (403, Forbidden, "Forbidden");
    (404, NotFound, "Not Found");
    (405, MethodNotAllowed, "Method Not Allowed");
    (406, NotAcceptable, "Not Acceptable");
    (407, ProxyAuthenticationRequired, "Proxy Authentication Required");
    (408, RequestTimeout, "Request Timeout");
    (409, Conflict, "Conflict");
    (410, Gone, "Gone");
    (411, LengthRequired, "Length Required");
    (412, PreconditionFailed, "Precondition Failed");
    (413, PayloadTooLarge, "Payload Too Large");
    (414, UriTooLong, "URI Too Long");
    (415, UnsupportedMediaType, "Unsupported Media Type");
    (416, RangeNotSatisfiable, "Range Not Satisfiable");
    (417, ExpectationFailed, "Expectation Failed");
    (421, MisdirectedRequest, "Misdirected Request");
    (426, UpgradeRequired, "Upgrade Required");
    (428, PreconditionRequired, "Precondition Required");
    (429, TooManyRequests, "Too Many Requests");
    (431, RequestHeaderFieldsTooLarge, "Request Header Fields Too Large");
    (451, UnavailableForLegalReasons, "Unavailable For Legal Reasons");
    (500, InternalServerError, "Internal Server Error");
    (501, NotImplemented, "Not Implemented");
    (502, BadGateway, "Bad Gateway");
    (503, ServiceUnavailable, "Service Unavailable");
    (504, GatewayTimeout, "Gateway Timeout");
    (505, HttpVersionNotSupported, "HTTP Version Not Supported");
    (511, NetworkAuthenticationRequired, "Network Authentication Required");
}

impl StatusCode {
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    pub fn is_informational(&self) -> bool {
        self.as_u16() < 200
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_str(), self.reason())
    }
}

impl From<StatusCode> for u16 {
    fn from(status: StatusCode) -> u16 {
        status.as_u16()
    }
}
