//! Day-of-week and per-month calendar table rendering (spec.md §4.7 "Month
//! calendar"). Grounded on `original_source/html.c`'s `dayofweek` (the
//! Tomohiko Sakamoto algorithm) and `html_output_month_cal`.

use crate::append_fmt;
use crate::buffer::ByteBuffer;

/// Day of week for a Gregorian `y`/`m`/`d` (0 = Sunday). Tomohiko Sakamoto's
/// algorithm, valid for the whole Gregorian range this crate cares about.
pub fn dayofweek(y: i32, m: u8, d: u8) -> i32 {
    const T: [i32; 12] = [0, 3, 2, 5, 0, 3, 5, 1, 4, 6, 2, 4];
    let y = if m < 3 { y - 1 } else { y };
    (y + y / 4 - y / 100 + y / 400 + T[m as usize - 1] + d as i32).rem_euclid(7)
}

fn is_leap_year(y: i32) -> bool {
    y % 4 == 0 && (y % 100 != 0 || y % 400 == 0)
}

fn days_in_month(y: i32, m: u8) -> u8 {
    if m == 2 {
        28 + is_leap_year(y) as u8
    } else {
        31 - (((m as u32 - 1) % 7) % 2) as u8
    }
}

/// Level at which the day link targets are relative: `Monthly` pages link
/// into `DD/`, `Daily` (already inside a month page) links straight to `DD/`
/// without another day-segment prefix — mirrors `html_date_level_t`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum DateLevel {
    Monthly,
    Daily,
}

/// Renders one month's `<table class=cal_mon>`. `slots` must hold at least
/// 32 entries: `slots[0]` is the running total just before day 1, and
/// `slots[d]` (`d` in 1..=31) is the day's slot value (same encoding as the
/// on-disk per-day array: positive = first ordinal of the day, non-positive
/// = negated count with no messages that day).
pub fn render_month_calendar(dst: &mut ByteBuffer, slots: &[i32], y: i32, m: u8, level: DateLevel) {
    append_fmt!(
        dst,
        "\n<table border=0 class=cal_mon><tr><th>Mon<th>Tue<th>Wed<th>Thu<th>Fri<th>Sat<th>Sun"
    );

    let days = days_in_month(y, m);
    let firstday = dayofweek(y, m, 1);
    // Monday-first week columns: Sunday (dayofweek 0) lands in column 6.
    let mut mp = slots[0];

    for d in 1..=days {
        let col = (7 + d as i32 + firstday - 1 - 1) % 7;
        if d == 1 || col == 0 {
            dst.append_str("\n<tr>");
        }
        if d == 1 && col > 0 {
            append_fmt!(dst, "<td colspan=\"{}\">", col);
        }
        append_fmt!(dst, "<td><sup>{}</sup>&nbsp;", d);

        let slot = slots[d as usize];
        if slot != 0 {
            if mp > 0 {
                let count = if slot > 0 { slot - mp } else { -slot };
                if count <= 0 {
                    return;
                }
                dst.append_str("<a href=\"");
                if level == DateLevel::Monthly {
                    append_fmt!(dst, "{:02}/", m);
                }
                append_fmt!(dst, "{:02}/\">{}</a>", d, count);
            }
            mp = slot;
        }
        if d == days && 7 - col - 1 > 0 {
            append_fmt!(dst, "<td colspan=\"{}\">", 7 - col - 1);
        }
    }
    dst.append_str("\n</table>\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dayofweek_matches_known_dates() {
        // 2000-01-01 was a Saturday.
        assert_eq!(dayofweek(2000, 1, 1), 6);
        // 2024-02-29 (leap day) was a Thursday.
        assert_eq!(dayofweek(2024, 2, 29), 4);
    }

    #[test]
    fn days_in_month_matches_calendar() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2024, 4), 30);
        assert_eq!(days_in_month(2024, 1), 31);
    }

    #[test]
    fn renders_table_with_day_links() {
        // Day 1 holds 3 messages (ordinals 1..3); day 2 carries the
        // negated-count terminator since it has none of its own. The
        // terminator slot is where the count link for the run actually
        // surfaces, matching the on-disk encoding's lookahead shape.
        let mut slots = [0i32; 32];
        slots[1] = 1;
        slots[2] = -3;
        let mut dst = ByteBuffer::with_capacity(0);
        render_month_calendar(&mut dst, &slots, 2024, 1, DateLevel::Daily);
        let out = String::from_utf8(dst.into_vec()).unwrap();
        assert!(out.contains("<table border=0 class=cal_mon>"));
        assert!(out.contains("href=\"02/\">3</a>"));
    }
}
