//! The per-request renderer (spec.md §6): a single binary whose behavior is
//! selected by `argv[1]` and, for non-attachment modes, driven by the SSI
//! environment (`SERVER_PROTOCOL`, `QUERY_STRING_UNESCAPED`) rather than by
//! ordinary flags. Grounded on `original_source/bit.c`'s dispatch — argument
//! count first, then invocation-mode/SSI consistency, then list-name syntax,
//! then the `y/m/d/n[/a]` numeric path — preserving that exact check order.

use std::io::Write;

use log::{debug, warn};

use blists::config::Config;
use blists::render::{self, HtmlFlags};
use blists::BlistsError;

enum Mode {
    Page(HtmlFlags),
    Attachment,
}

fn split_list_path(input: &str) -> Option<(&str, &str)> {
    let bytes = input.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if i >= 99 {
            return None;
        }
        if b.is_ascii_lowercase() || b.is_ascii_digit() || (i != 0 && b == b'-') {
            continue;
        }
        if b == b'/' {
            return Some((&input[..i], &input[i + 1..]));
        }
        return None;
    }
    Some((input, ""))
}

fn parse_uints(path: &str, n: usize) -> Option<Vec<u32>> {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() != n {
        return None;
    }
    parts
        .iter()
        .map(|p| {
            if p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()) {
                None
            } else {
                p.parse::<u32>().ok()
            }
        })
        .collect()
}

/// Renders the page or attachment selected by `mode`, `list` and the
/// remaining path, mirroring `bit.c`'s cascading `sscanf` attempts in order
/// (attachment / message / day / month / year / root).
fn dispatch(config: &Config, mode: &Mode, list: &str, path: &str) -> Result<Vec<u8>, BlistsError> {
    match mode {
        Mode::Attachment => {
            let v = parse_uints(path, 5).ok_or(BlistsError::InvalidParams)?;
            render::attachment(config, list, v[0] as i32, v[1] as u8, v[2] as u8, v[3], v[4])
        }
        Mode::Page(flags) => {
            if let Some(v) = parse_uints(path, 4) {
                return render::message(config, list, v[0] as i32, v[1] as u8, v[2] as u8, v[3], *flags);
            }
            if let Some(v) = parse_uints(path, 3) {
                return render::day_index(config, list, v[0] as i32, v[1] as u8, v[2] as u8, *flags);
            }
            if let Some(v) = parse_uints(path, 2) {
                return render::month_index(config, list, v[0] as i32, v[1] as u8, *flags);
            }
            if let Some(v) = parse_uints(path, 1) {
                if v[0] != 0 {
                    return render::year_index(config, list, v[0] as i32, *flags);
                }
            }
            if path.is_empty() {
                return render::year_index(config, list, 0, *flags);
            }
            Err(BlistsError::InvalidParams)
        }
    }
}

/// Prints `msg` the way `html_error_real` does: a `Status: 404`/plain-text
/// response outside SSI, or an inline `<title>`/`<p>` snippet inside it, and
/// a diagnostic line to stderr either way.
fn html_error(ssi: bool, flags: HtmlFlags, msg: &str) -> i32 {
    let config = Config::default();
    if !ssi {
        print!("Status: 404 Not Found\nContent-Type: text/plain\n\nThe request has failed: {msg}\n");
    } else if flags.header {
        print!("\n<title>The request has failed: {msg}</title>\n<meta name=\"robots\" content=\"noindex\">\n");
    } else {
        print!("\n<p>The request has failed: {msg}\n{}", config.footer);
    }
    let _ = std::io::stdout().flush();
    warn!("request failed: {msg}");
    1
}

fn run() -> i32 {
    let config = Config::default();
    let args: Vec<String> = std::env::args().collect();

    let (mode, attachment_list) = match args.len() {
        2 => match HtmlFlags::from_mode(&args[1]) {
            Some(flags) => (Mode::Page(flags), None),
            None => return html_error(false, HtmlFlags::default(), "Invalid arguments"),
        },
        3 if args[1] == "attachment" => (Mode::Attachment, Some(args[2].clone())),
        _ => return html_error(false, HtmlFlags::default(), "Invalid arguments"),
    };

    let flags = match &mode {
        Mode::Page(f) => *f,
        Mode::Attachment => HtmlFlags::default(),
    };
    let ssi = std::env::var("SERVER_PROTOCOL").as_deref() == Ok("INCLUDED");

    let list_and_path = match &mode {
        Mode::Attachment => {
            if ssi {
                return html_error(ssi, flags, "Invalid invocation mode");
            }
            attachment_list
        }
        Mode::Page(_) => {
            if !ssi {
                return html_error(ssi, flags, "Invalid invocation mode");
            }
            std::env::var("QUERY_STRING_UNESCAPED").ok()
        }
    };

    let Some(list_and_path) = list_and_path else {
        return html_error(ssi, flags, "Invalid request syntax");
    };

    let Some((list, path)) = split_list_path(&list_and_path) else {
        return html_error(ssi, flags, "Invalid request syntax");
    };
    if !render::valid_list_name(list) {
        return html_error(ssi, flags, "Invalid request syntax");
    }

    debug!("request list={list:?} path={path:?} ssi={ssi}");

    match dispatch(&config, &mode, list, path) {
        Ok(bytes) => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            if handle.write_all(&bytes).is_err() {
                return html_error(ssi, flags, "Internal server error");
            }
            0
        }
        Err(e) => html_error(ssi, flags, e.user_message().unwrap_or("Internal server error")),
    }
}

fn main() {
    env_logger::init();
    std::process::exit(run());
}
