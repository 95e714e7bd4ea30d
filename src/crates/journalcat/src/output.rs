use chrono::{DateTime, Local, SecondsFormat, Utc};
use std::io::{self, Write};

/// RFC 3339 rendering of a realtime timestamp in microseconds.
pub fn format_timestamp(usec: u64, utc: bool) -> String {
    let Ok(usec) = i64::try_from(usec) else {
        return format!("{usec}");
    };
    let Some(dt) = DateTime::<Utc>::from_timestamp_micros(usec) else {
        return format!("{usec}");
    };

    if utc {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    } else {
        dt.with_timezone(&Local)
            .to_rfc3339_opts(SecondsFormat::Micros, false)
    }
}

/// Field values are printed up to the first NUL byte.
pub fn display_value(value: &[u8]) -> &[u8] {
    match value.iter().position(|&b| b == 0) {
        Some(nul) => &value[..nul],
        None => value,
    }
}

/// `<time> <value>` for one entry.
pub fn write_line(w: &mut impl Write, realtime: u64, value: &[u8], utc: bool) -> io::Result<()> {
    write!(w, "{} ", format_timestamp(realtime, utc))?;
    w.write_all(display_value(value))?;
    writeln!(w)
}
