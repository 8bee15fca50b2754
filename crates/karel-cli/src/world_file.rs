//! Text world format for the CLI host
//!
//! Line 1: `x y dir home_x home_y` (dir 0-3: north east south west).
//! Then 20 rows of 20 characters, row y=0 first: `.` empty square, `#` wall,
//! `1`..`8` flag count. This is a host-side convenience; the runtime only
//! speaks the 400-byte external encoding.

use anyhow::{bail, Context, Result};
use karel_runtime::world::{CITY_AREA, CITY_DIM, EXTERNAL_WALL};
use std::fmt::Write as _;
use std::fs;

/// Load a world file into the runtime's external encoding.
pub fn load(path: &str) -> Result<([u8; CITY_AREA], [u32; 5])> {
    let text = fs::read_to_string(path).with_context(|| format!("cannot read world file {path}"))?;
    parse(&text).with_context(|| format!("malformed world file {path}"))
}

/// Parse the text format. Split from [`load`] for testability.
pub fn parse(text: &str) -> Result<([u8; CITY_AREA], [u32; 5])> {
    let mut lines = text.lines();

    let pose_line = lines.next().context("missing pose line")?;
    let pose: Vec<u32> = pose_line
        .split_whitespace()
        .map(|word| word.parse::<u32>().with_context(|| format!("bad pose field {word:?}")))
        .collect::<Result<_>>()?;
    let karel: [u32; 5] = pose
        .try_into()
        .map_err(|_| anyhow::anyhow!("pose line needs exactly 5 fields"))?;

    let mut city = [0u8; CITY_AREA];
    for y in 0..CITY_DIM {
        let row = lines
            .next()
            .with_context(|| format!("missing city row {y}"))?;
        let chars: Vec<char> = row.chars().collect();
        if chars.len() != CITY_DIM as usize {
            bail!("city row {y} has {} squares, expected {CITY_DIM}", chars.len());
        }
        for (x, &ch) in chars.iter().enumerate() {
            city[x + y as usize * CITY_DIM as usize] = match ch {
                '.' => 0,
                '#' => EXTERNAL_WALL,
                '1'..='8' => ch as u8 - b'0',
                other => bail!("city row {y} square {x}: unknown character {other:?}"),
            };
        }
    }

    Ok((city, karel))
}

/// Render a world for terminal output, top row = highest y, Karel as `K`.
pub fn render(city: &[u8; CITY_AREA], karel: &[u32; 5]) -> String {
    let mut out = String::new();
    for y in (0..CITY_DIM as usize).rev() {
        for x in 0..CITY_DIM as usize {
            let ch = if karel[0] as usize == x && karel[1] as usize == y {
                'K'
            } else {
                match city[x + y * CITY_DIM as usize] {
                    0 => '.',
                    EXTERNAL_WALL => '#',
                    n => (b'0' + n) as char,
                }
            };
            out.push(ch);
        }
        out.push('\n');
    }
    let dir = ["north", "east", "south", "west"]
        .get(karel[2] as usize)
        .copied()
        .unwrap_or("?");
    writeln!(
        out,
        "karel at ({}, {}) facing {dir}, home ({}, {})",
        karel[0], karel[1], karel[3], karel[4]
    )
    .unwrap();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_world() -> String {
        let mut text = String::from("0 0 1 5 5\n");
        for y in 0..20 {
            let mut row = String::new();
            for x in 0..20 {
                row.push(match (x, y) {
                    (3, 0) => '#',
                    (1, 2) => '4',
                    _ => '.',
                });
            }
            text.push_str(&row);
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_parse_sample_world() {
        let (city, karel) = parse(&sample_world()).unwrap();
        assert_eq!(karel, [0, 0, 1, 5, 5]);
        assert_eq!(city[3], EXTERNAL_WALL);
        assert_eq!(city[1 + 2 * 20], 4);
        assert_eq!(city[0], 0);
    }

    #[test]
    fn test_parse_rejects_short_row() {
        let text = "0 0 0 0 0\n....\n";
        assert!(parse(text).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_pose() {
        let text = "0 0 0 0\n";
        assert!(parse(text).is_err());
    }

    #[test]
    fn test_render_marks_karel() {
        let (city, karel) = parse(&sample_world()).unwrap();
        let rendered = render(&city, &karel);
        // Karel at (0, 0) is the first square of the last grid row.
        let rows: Vec<&str> = rendered.lines().collect();
        assert!(rows[19].starts_with('K'));
        assert!(rendered.contains("facing east"));
    }
}
