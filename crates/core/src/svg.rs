//! SVG renderer: converts `RenderCommand` lists into standalone SVG strings.

use std::fmt::Write as _;

use lanescope_protocol::{RenderCommand, ThemeToken};

/// Render a list of commands as an SVG document string.
///
/// `width` and `height` define the SVG viewBox dimensions. State tokens are
/// painted with their fixed colors, chrome tokens with a light palette.
pub fn render_svg(commands: &[RenderCommand], width: f64, height: f64) -> String {
    let mut svg = String::with_capacity(commands.len() * 96 + 256);
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {width} {height}" width="{width}" height="{height}" style="font-family:system-ui,-apple-system,sans-serif;font-size:11px">"#,
    );
    let _ = write!(
        svg,
        r#"<rect width="{width}" height="{height}" fill="{}"/>"#,
        resolve_color(ThemeToken::Background),
    );

    for cmd in commands {
        match cmd {
            RenderCommand::ClearRect { rect } => {
                let _ = write!(
                    svg,
                    r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}"/>"#,
                    rect.x,
                    rect.y,
                    rect.w,
                    rect.h,
                    resolve_color(ThemeToken::Background),
                );
            }
            RenderCommand::DrawRect {
                rect,
                color,
                unit_id,
            } => {
                let _ = write!(
                    svg,
                    r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}">"#,
                    rect.x,
                    rect.y,
                    rect.w,
                    rect.h,
                    resolve_color(*color),
                );
                if let Some(id) = unit_id {
                    let _ = write!(svg, "<title>goroutine {id}</title>");
                }
                svg.push_str("</rect>");
            }
            RenderCommand::DrawLine {
                from,
                to,
                color,
                width: line_width,
            } => {
                let _ = write!(
                    svg,
                    r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="{line_width}"/>"#,
                    from.x,
                    from.y,
                    to.x,
                    to.y,
                    resolve_color(*color),
                );
            }
            RenderCommand::DrawText {
                text,
                position,
                color,
                font_size,
            } => {
                // Positions are top-left; SVG text sits on its baseline.
                let _ = write!(
                    svg,
                    r#"<text x="{}" y="{}" fill="{}" font-size="{font_size}">{}</text>"#,
                    position.x,
                    position.y + font_size * 0.8,
                    resolve_color(*color),
                    escape_xml(text),
                );
            }
        }
    }

    svg.push_str("</svg>");
    svg
}

fn resolve_color(token: ThemeToken) -> String {
    if let Some(color) = token.fixed_color() {
        return color.to_hex();
    }
    match token {
        ThemeToken::BatchBoundary => "#000000",
        ThemeToken::AxisBackground => "#f1f3f5",
        ThemeToken::AxisTick => "#868e96",
        ThemeToken::AxisLabel | ThemeToken::TextMuted => "#495057",
        _ => "#ffffff",
    }
    .to_string()
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
