use std::net::SocketAddr;
use std::str::FromStr;

use nom::bytes::streaming::{tag, take_until};
use nom::character::streaming::{char, digit1};
use nom::combinator::{map_res, opt};
use nom::sequence::{preceded, separated_pair};

// The debugger server speaks HTTP. Seeing any status line back is enough to
// know it is up, so only the first line of the response is parsed.

pub fn status_request(addr: SocketAddr) -> String {
    format!("GET / HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n")
}

#[derive(Debug, PartialEq, Eq)]
pub struct StatusLine<'a> {
    pub version: (u8, u8),
    pub code: u16,
    pub reason: &'a str,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Parse<R> {
    Done(R),
    MoreData,
    Invalid,
}

fn decimal<T: FromStr>(input: &[u8]) -> nom::IResult<&[u8], T> {
    map_res(digit1, |digits: &[u8]| {
        std::str::from_utf8(digits)
            .map_err(|_| ())
            .and_then(|digits| digits.parse::<T>().map_err(|_| ()))
    })(input)
}

fn version(input: &[u8]) -> nom::IResult<&[u8], (u8, u8)> {
    preceded(tag("HTTP/"), separated_pair(decimal::<u8>, char('.'), decimal::<u8>))(input)
}

fn status_line(input: &[u8]) -> nom::IResult<&[u8], StatusLine<'_>> {
    let (input, version) = version(input)?;
    let (input, _) = char(' ')(input)?;
    let (input, code) = decimal::<u16>(input)?;
    let (input, reason) = opt(preceded(
        char(' '),
        map_res(take_until("\r\n"), std::str::from_utf8),
    ))(input)?;
    let (input, _) = tag("\r\n")(input)?;

    Ok((
        input,
        StatusLine {
            version,
            code,
            reason: reason.unwrap_or_default(),
        },
    ))
}

pub fn parse_status_line(buf: &[u8]) -> Parse<StatusLine<'_>> {
    match status_line(buf) {
        Ok((_, line)) => Parse::Done(line),
        Err(nom::Err::Incomplete(_)) => Parse::MoreData,
        Err(_) => Parse::Invalid,
    }
}
