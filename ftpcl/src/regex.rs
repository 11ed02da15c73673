//! # FTP Regex
//!
//! Regular expressions to parse FTP response

use lazy_regex::{Lazy, Regex};

/// This regex matches every run of decimal digits in a PASV response.
/// The last two matches are the port halves; whatever wraps them
/// (parentheses, `=`, trailing dot) does not matter.
pub static PASV_NUMBER_RE: Lazy<Regex> = lazy_regex!(r"\d+");
