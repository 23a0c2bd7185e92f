//! ThingSpeak update request and response handling.
//!
//! Requests are written as a single HTTP/1.1 `POST /update` with the channel
//! write key in the `X-THINGSPEAKAPIKEY` header and the values as a form body:
//!
//! - `field1`: TVOC in ppb
//! - `field2`: CO in ppm
//! - `field3`: overall severity code (0 normal, 1 warning, 2 danger)
//!
//! The server answers with the new entry id, or `0` when it refused the
//! entry (rate limit, bad field data).

use core::fmt::Write;

use heapless::String;

use crate::constants::HTTP_REQUEST_CAPACITY;
use crate::error::UploadError;
use crate::reading::Reading;
use crate::severity::Assessment;

pub const UPDATE_PATH: &str = "/update";
pub const API_KEY_HEADER: &str = "X-THINGSPEAKAPIKEY";

/// A successful upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadResult {
    pub entry_id: u32,
}

pub fn format_body(
    reading: &Reading,
    assessment: &Assessment,
) -> Result<String<64>, core::fmt::Error> {
    let mut body: String<64> = String::new();
    write!(
        body,
        "field1={:.1}&field2={:.1}&field3={}",
        reading.tvoc_ppb,
        reading.co_ppm,
        assessment.overall.code()
    )?;
    Ok(body)
}

pub fn format_update_request(
    host: &str,
    api_key: &str,
    reading: &Reading,
    assessment: &Assessment,
) -> Result<String<HTTP_REQUEST_CAPACITY>, core::fmt::Error> {
    let body = format_body(reading, assessment)?;

    let mut request: String<HTTP_REQUEST_CAPACITY> = String::new();
    write!(request, "POST {} HTTP/1.1\r\n", UPDATE_PATH)?;
    write!(request, "Host: {}\r\n", host)?;
    write!(request, "{}: {}\r\n", API_KEY_HEADER, api_key)?;
    write!(
        request,
        "Content-Type: application/x-www-form-urlencoded\r\n"
    )?;
    write!(request, "Content-Length: {}\r\n", body.len())?;
    write!(request, "Connection: close\r\n\r\n")?;
    write!(request, "{}", body)?;

    Ok(request)
}

/// Position right after the `\r\n\r\n` that ends the headers.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Maps a complete HTTP response (headers and body) to the upload outcome.
pub fn parse_update_response(response: &[u8]) -> Result<UploadResult, UploadError> {
    let header_end = find_header_end(response).ok_or(UploadError::ServerError(0))?;
    let head =
        core::str::from_utf8(&response[..header_end]).map_err(|_| UploadError::ServerError(0))?;

    let mut lines = head.split("\r\n");
    let status = parse_status_line(lines.next().unwrap_or_default())?;

    match status {
        400 | 401 | 403 => return Err(UploadError::AuthRejected),
        200..=299 => {}
        _ => return Err(UploadError::ServerError(status)),
    }

    let chunked = is_chunked(lines);

    let body = &response[header_end..];
    let body = if chunked { first_chunk(body)? } else { body };

    let entry_id = core::str::from_utf8(body)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .ok_or(UploadError::ServerError(status))?;

    if entry_id == 0 {
        log::warn!("Server refused the entry (rate limited or invalid fields)");
        return Err(UploadError::ServerError(0));
    }

    Ok(UploadResult { entry_id })
}

/// Whether `buf` already holds the headers and the whole entry id, so the
/// reader can stop without waiting for the server to close.
pub fn response_complete(buf: &[u8]) -> bool {
    let Some(header_end) = find_header_end(buf) else {
        return false;
    };
    // Let the parser report it
    let Ok(head) = core::str::from_utf8(&buf[..header_end]) else {
        return true;
    };
    let body = &buf[header_end..];

    let mut lines = head.split("\r\n").skip(1);
    if is_chunked(lines.clone()) {
        return first_chunk(body).is_ok();
    }
    match lines.find_map(|line| header_value(line, "content-length")) {
        Some(len) => len.parse::<usize>().is_ok_and(|len| body.len() >= len),
        None => false,
    }
}

fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    line.split_once(':')
        .filter(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
}

fn is_chunked<'a>(mut lines: impl Iterator<Item = &'a str>) -> bool {
    lines.any(|line| {
        header_value(line, "transfer-encoding").is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
    })
}

fn parse_status_line(line: &str) -> Result<u16, UploadError> {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some(version) if version.starts_with("HTTP/") => {}
        _ => return Err(UploadError::ServerError(0)),
    }
    parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or(UploadError::ServerError(0))
}

fn first_chunk(body: &[u8]) -> Result<&[u8], UploadError> {
    let size_end = body
        .windows(2)
        .position(|w| w == b"\r\n")
        .ok_or(UploadError::ServerError(0))?;
    let size_str = core::str::from_utf8(&body[..size_end]).map_err(|_| UploadError::ServerError(0))?;
    // Chunk extensions follow a ';'
    let size_str = size_str.split(';').next().unwrap_or_default().trim();
    let size = usize::from_str_radix(size_str, 16).map_err(|_| UploadError::ServerError(0))?;

    let start = size_end + 2;
    start
        .checked_add(size)
        .and_then(|end| body.get(start..end))
        .ok_or(UploadError::ServerError(0))
}
