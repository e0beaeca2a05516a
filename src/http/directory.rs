//! HTML rendering of `.cache` listings for the HTTP gateway.

use std::fmt::Write as _;

/// What the renderer needs to know about this server.
#[derive(Debug, Clone)]
pub struct ListingStyle {
    pub hostname: String,
    pub icon_width: u32,
    pub icon_height: u32,
}

/// Renders a listing file as an HTML page. `dir` is the requested directory.
pub fn render_listing(listing: &[u8], dir: &str, style: &ListingStyle) -> Vec<u8> {
    let title = if dir.is_empty() || dir == "/" { "[Root]" } else { dir };
    let title = escape(title);

    let mut html = String::with_capacity(listing.len() * 2 + 512);
    let _ = write!(
        html,
        "<!DOCTYPE HTML PUBLIC \"-//W3C//DTD HTML 4.01 Transitional//EN\">\n\
         <html>\n<head><title>{title}</title></head>\n\
         <body bgcolor=white>\n\n\
         <center>\n<table border=0 width=\"90%\">\n\
         <tr><td colspan=2><h1>{title}</h1>\n\
         <tr><td colspan=2><hr>\n"
    );

    let text = String::from_utf8_lossy(listing);
    for line in text.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line == "." {
            continue;
        }
        render_line(&mut html, line, style);
    }

    let _ = write!(
        html,
        "<tr><td colspan=2><hr>\n\
         <tr><td colspan=2><small>Burrow {} gopher to http gateway.</small>\n\
         </table>\n</center>\n\n</body>\n</html>\n",
        env!("CARGO_PKG_VERSION")
    );

    html.into_bytes()
}

fn render_line(html: &mut String, line: &str, style: &ListingStyle) {
    let mut chars = line.chars();
    let Some(kind) = chars.next() else {
        return;
    };
    let mut fields = chars.as_str().split('\t');
    let desc = fields.next().unwrap_or("");
    let selector = fields.next().unwrap_or("");
    let host = fields.next().unwrap_or("");
    let port = fields.next().unwrap_or("");

    html.push_str("<tr>\n");

    if kind == 'i' {
        let _ = writeln!(html, " <td>&nbsp;<td>{}", escape(desc));
        return;
    }

    let icon = match kind {
        '0' => "text",
        '1' => "menu",
        '9' => "binary",
        'h' => "html",
        'I' => "image",
        _ => "unknown",
    };
    let _ = write!(
        html,
        " <td width={}><img src=\"/g/icons/gopher_{icon}.gif\" width={} height={} alt=\"[{icon}]\">\n <td>",
        style.icon_width + 4,
        style.icon_width,
        style.icon_height,
    );

    // The selector field carries its own type character first.
    let path = selector.get(kind.len_utf8()..).unwrap_or("");

    if host != style.hostname && host != "localhost" {
        let _ = write!(html, "{} <small>[gopher://{}", escape(desc), escape(host));
        if !port.is_empty() && port != "70" {
            let _ = write!(html, ":{port}");
        }
        html.push('/');
        if !(kind == '1' && (path.is_empty() || path == "/")) {
            html.push(kind);
            html.push_str(&escape(path));
        }
        html.push_str("]</small>\n");
    } else {
        let _ = writeln!(html, "<a href=\"/{kind}{}\">{}</a>", escape(path), escape(desc));
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style() -> ListingStyle {
        ListingStyle {
            hostname: "gopher.example".to_string(),
            icon_width: 20,
            icon_height: 22,
        }
    }

    #[test]
    fn local_entries_become_links() {
        let html = render_listing(b"0Read me\t0/docs/readme.txt\tgopher.example\t70\r\n", "docs", &style());
        let html = String::from_utf8(html).unwrap();
        assert!(html.contains("<a href=\"/0/docs/readme.txt\">Read me</a>"));
        assert!(html.contains("<title>docs</title>"));
    }

    #[test]
    fn remote_entries_show_the_gopher_url() {
        let html = render_listing(b"1Elsewhere\t1/\tfar.away\t7070\n", "", &style());
        let html = String::from_utf8(html).unwrap();
        assert!(html.contains("Elsewhere <small>[gopher://far.away:7070/]</small>"));
        assert!(html.contains("<title>[Root]</title>"));
    }

    #[test]
    fn info_lines_are_escaped_text() {
        let html = render_listing(b"i<b>hi</b>\t\t\t\n", "/", &style());
        let html = String::from_utf8(html).unwrap();
        assert!(html.contains(" <td>&nbsp;<td>&lt;b&gt;hi&lt;/b&gt;\n"));
    }
}
