/// Completion status of a connection.
///
/// The numeric values follow HTTP conventions so that the hit log reads the
/// same for both protocols. `Stats` is internal and never logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// 200
    Ok,
    /// 400
    BadRequest,
    /// 403, all connection slots busy
    TooManyRequests,
    /// 404
    NotFound,
    /// 408, idle timeout or an I/O failure
    Timeout,
    /// 410, readiness reported an invalid descriptor
    Gone,
    /// 414
    TooLarge,
    /// 500
    ServerError,
    /// 501
    NotImplemented,
    /// 503, cache pool exhausted
    Unavailable,
    /// 504, peer hung up
    HungUp,
    /// 1000, the STATS request
    Stats,
}

impl Status {
    /// Returns the numeric status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use burrow::status::Status;
    /// assert_eq!(Status::Ok.as_u16(), 200);
    /// assert_eq!(Status::TooLarge.as_u16(), 414);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::TooManyRequests => 403,
            Status::NotFound => 404,
            Status::Timeout => 408,
            Status::Gone => 410,
            Status::TooLarge => 414,
            Status::ServerError => 500,
            Status::NotImplemented => 501,
            Status::Unavailable => 503,
            Status::HungUp => 504,
            Status::Stats => 1000,
        }
    }

    /// Returns the reason phrase used in error lines and HTTP status lines.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::TooManyRequests => "Too Many Requests",
            Status::NotFound => "Not Found",
            Status::Timeout => "Request Timeout",
            Status::Gone => "Gone",
            Status::TooLarge => "Request-URI Too Long",
            Status::ServerError => "Server Error",
            Status::NotImplemented => "Not Implemented",
            Status::Unavailable => "Server Unavailable",
            Status::HungUp => "Gateway Timeout",
            Status::Stats => "Stats",
        }
    }

    /// Whether the hit log records connections closed with this status.
    pub fn is_logged(&self) -> bool {
        *self != Status::Stats
    }

    /// Whether a gopher client should be sent an error line on close.
    pub fn wants_error_line(&self) -> bool {
        !matches!(self, Status::Ok | Status::HungUp | Status::Stats)
    }
}
