use std::fmt::Write;

use crate::core::types::{ImageReport, WidgetKeys};

/// Inputs for one page render
pub struct PageView<'a> {
    pub widget_keys: &'a WidgetKeys,
    pub reports: &'a [ImageReport],
    pub error: Option<&'a str>,
    pub chart_color: &'a str,
    pub accept: &'a str,
    pub model_id: &'a str,
}

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; margin: 0; display: flex; color: #262730; }
aside { width: 18rem; min-height: 100vh; background: #f0f2f6; padding: 1.5rem; box-sizing: border-box; }
main { flex: 1; padding: 2rem 3rem; max-width: 70rem; }
.info { background: #e8f0fe; border-radius: .5rem; padding: .75rem 1rem; }
.error { background: #fde8e8; border-radius: .5rem; padding: .75rem 1rem; color: #8a1c1c; }
.reset { background: #ff4b4b; color: white; border: 0; border-radius: .5rem; padding: .5rem 1rem; cursor: pointer; }
.inputs { display: flex; gap: 2rem; }
.inputs fieldset { flex: 1; border: 1px solid #ddd; border-radius: .5rem; }
.result { display: flex; gap: 2rem; border-bottom: 1px solid #ddd; padding: 1.5rem 0; }
.result figure { flex: 1; margin: 0; }
.result figure img { width: 100%; border-radius: .25rem; }
.result .summary { flex: 2; }
.caption { color: #808495; font-size: .9rem; }
.bar-row { display: flex; align-items: center; gap: .5rem; margin: .25rem 0; }
.bar-label { width: 12rem; text-align: right; font-size: .85rem; overflow: hidden; text-overflow: ellipsis; white-space: nowrap; }
.bar-track { flex: 1; background: #f0f2f6; height: 1rem; }
.bar { height: 100%; }
"#;

pub fn render_page(view: &PageView<'_>) -> String {
    let mut html = String::with_capacity(4096 + view.reports.len() * 2048);

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str("<title>Image Classifier</title>\n<style>");
    html.push_str(STYLE);
    html.push_str("</style>\n</head>\n<body>\n");

    render_sidebar(&mut html, view);

    html.push_str("<main>\n<h1>🖼️ AI Image Classification</h1>\n");
    html.push_str("<h3>Find out what is in your photo</h3>\n");

    render_inputs(&mut html, view);

    if let Some(error) = view.error {
        let _ = writeln!(html, "<p class=\"error\">{}</p>", escape(error));
    }

    if !view.reports.is_empty() {
        let _ = writeln!(
            html,
            "<hr>\n<p>Analyzing {} image{}.</p>",
            view.reports.len(),
            if view.reports.len() == 1 { "" } else { "s" }
        );
        for report in view.reports {
            render_report(&mut html, report, view.chart_color);
        }
    }

    html.push_str("</main>\n</body>\n</html>\n");
    html
}

fn render_sidebar(html: &mut String, view: &PageView<'_>) {
    html.push_str("<aside>\n<h2>How to use</h2>\n<div class=\"info\"><ol>");
    html.push_str("<li>Choose <b>File upload</b> or <b>Camera</b>.</li>");
    html.push_str("<li>Images are analyzed as soon as they are added.</li>");
    html.push_str("<li>Check the detailed probability chart.</li>");
    html.push_str("</ol></div>\n<hr>\n");
    html.push_str("<form method=\"post\" action=\"/reset\">");
    html.push_str("<button class=\"reset\" type=\"submit\">🗑️ Reset everything</button></form>\n<hr>\n");
    let _ = writeln!(
        html,
        "<p class=\"caption\">Powered by {}</p>\n</aside>",
        escape(view.model_id)
    );
}

fn render_inputs(html: &mut String, view: &PageView<'_>) {
    let keys = view.widget_keys;
    html.push_str(
        "<form class=\"inputs\" method=\"post\" action=\"/analyze\" enctype=\"multipart/form-data\">\n",
    );
    let _ = writeln!(
        html,
        "<fieldset><legend>📁 File upload</legend>\
         <label>Choose image files (several allowed)<br>\
         <input type=\"file\" name=\"{}\" accept=\"{}\" multiple onchange=\"this.form.submit()\"></label>\
         </fieldset>",
        escape(&keys.uploader),
        escape(view.accept)
    );
    let _ = writeln!(
        html,
        "<fieldset><legend>📸 Camera</legend>\
         <label>Take a photo<br>\
         <input type=\"file\" name=\"{}\" accept=\"image/*\" capture=\"environment\" onchange=\"this.form.submit()\"></label>\
         </fieldset>",
        escape(&keys.camera)
    );
    html.push_str("<noscript><button type=\"submit\">Analyze</button></noscript>\n</form>\n");
}

fn render_report(html: &mut String, report: &ImageReport, chart_color: &str) {
    html.push_str("<section class=\"result\">\n");
    let _ = writeln!(
        html,
        "<figure><img src=\"{}\" alt=\"{}\"><figcaption class=\"caption\">{}</figcaption></figure>",
        report.thumbnail_data_url,
        escape(&report.image_caption),
        escape(&report.image_caption)
    );

    html.push_str("<div class=\"summary\">\n");
    let _ = writeln!(html, "<h2>{}</h2>", escape(&report.heading));
    let _ = writeln!(html, "<p class=\"caption\">{}</p>", escape(&report.caption));

    html.push_str("<div class=\"chart\">\n");
    for bar in &report.chart {
        let width = (bar.confidence as f64 * 100.0).clamp(0.0, 100.0);
        let _ = writeln!(
            html,
            "<div class=\"bar-row\"><span class=\"bar-label\" title=\"{label}\">{label}</span>\
             <div class=\"bar-track\"><div class=\"bar\" style=\"width:{width:.2}%;background:{color}\"></div></div></div>",
            label = escape(&bar.label),
            width = width,
            color = chart_color
        );
    }
    html.push_str("</div>\n");

    html.push_str("<details><summary>Show detailed scores</summary><ul>\n");
    for line in &report.details {
        let _ = writeln!(
            html,
            "<li><b>{}</b> ({}): {}</li>",
            escape(&line.translated),
            escape(&line.original),
            escape(&line.percent)
        );
    }
    html.push_str("</ul></details>\n</div>\n</section>\n");
}

/// Minimal HTML text/attribute escaping
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
