/// Human readable byte count: plain bytes below 1KB, then KB, MB, GB.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        bytes.to_string()
    } else if bytes < MB {
        format!("{}KB", trim(bytes as f64 / KB as f64))
    } else if bytes < GB {
        format!("{}MB", trim(bytes as f64 / MB as f64))
    } else {
        format!("{}GB", trim(bytes as f64 / GB as f64))
    }
}

fn trim(value: f64) -> String {
    let s = format!("{:.2}", value);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}
