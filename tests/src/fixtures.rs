//! Test fixtures: access log lines and export files.

use std::io::Write;
use std::path::Path;

/// One combined log line with a referrer.
pub const COMBINED_LINE: &str = r#"127.0.0.1 - - [10/Oct/2000:13:55:36 -0700] "GET /test.html HTTP/1.1" 200 2326 "http://www.example.com/start.html" "Mozilla/5.0""#;

/// The same visitor and path without a referrer.
pub const COMBINED_LINE_NO_REF: &str = r#"127.0.0.1 - - [10/Oct/2000:13:55:36 -0700] "GET /test.html HTTP/1.1" 200 2326 "-" "Mozilla/5.0""#;

/// A common log line: no referrer or user agent fields.
pub const COMMON_LINE: &str =
    r#"127.0.0.1 - - [10/Oct/2000:13:55:36 -0700] "GET /test.html HTTP/1.1" 200 2326"#;

/// An access log with a page view followed by a repeat visit.
pub fn access_log() -> String {
    format!("{}\n{}\n", COMBINED_LINE, COMBINED_LINE_NO_REF)
}

/// A CSV export of three hits on three paths over two sessions. Every row
/// carries `First visit = 1`.
pub const EXPORT_CSV: &str = "\
Site,Path,Title,Event,User agent,Session,Bot,Referrer,Referrer scheme,Screen size,Location,First visit,Date
1,/1,One,false,\"Mozilla/5.0 (X11; Linux x86_64; rv:83.0) Gecko/20100101 Firefox/83.0\",00112233445566778899aabbccddef03,0,,,\"1280,768,1\",AR,1,2020-12-01T00:07:10Z
1,/2,Two,false,\"Mozilla/5.0 (X11; Linux x86_64; rv:83.0) Gecko/20100101 Firefox/83.0\",00112233445566778899aabbccddef03,0,,,\"1280,768,1\",AR,1,2020-12-01T00:07:44Z
1,/3,Three,false,\"Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/87.0.4280.88 Safari/537.36\",00112233445566778899aabbccddef04,0,www.reddit.com,o,\"1680,1050,2\",RO,1,2020-12-27T00:37:37Z
";

/// `line` repeated `n` times.
pub fn repeat(line: &str, n: usize) -> Vec<String> {
    vec![line.to_string(); n]
}

/// Append lines to a file, flushing after each one.
pub fn write_lines(path: &Path, lines: &[String]) {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .expect("Failed to open log for appending");
    for line in lines {
        writeln!(file, "{}", line).expect("Failed to append line");
        file.flush().expect("Failed to flush line");
    }
}
