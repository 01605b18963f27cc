//! Standalone HTML page embedding one panorama viewer.
//!
//! The page is a full-window black canvas that loads the viewer script and
//! embeds `<pname>.xml` in HTML5-only mode. Title and description come from
//! the descriptor; the title falls back to the pname.
//!
//! Uses [maud](https://maud.lambda.xyz/) like the rest of the HTML output.
//! Unlike scene generation, the page is rewritten on every build that asks
//! for it: it is cheap and depends on descriptor fields the staleness check
//! does not see.

use crate::context::{BuildContext, BuildEvent};
use crate::descriptor::SceneDescriptor;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const PAGE_CSS: &str = "html { height:100%; }\n\
body { height:100%; overflow:hidden; margin:0; padding:0; font-family:Arial, Helvetica, sans-serif; font-size:16px; color:#FFFFFF; background-color:#000000; }";

const VIEWPORT: &str = "width=device-width, initial-scale=1.0, minimum-scale=1.0, maximum-scale=1.0, viewport-fit=cover";

/// The `embedpano(...)` call for a scene document.
fn embed_call(pname: &str) -> String {
    // serde_json gives a correctly escaped JS string literal.
    let xml = serde_json::Value::String(format!("{pname}.xml"));
    format!(
        "embedpano({{xml:{xml}, target:\"pano\", html5:\"only\", mobilescale:1.0, passQueryParameters:true}});"
    )
}

/// Render the page for a descriptor, loading `viewer_script` (relative URL).
pub fn render(descriptor: &SceneDescriptor, viewer_script: &str) -> Markup {
    let title = descriptor.title.as_deref().unwrap_or(&descriptor.pname);
    html! {
        (DOCTYPE)
        html {
            head {
                title { (title) }
                @if let Some(description) = &descriptor.description {
                    meta name="description" content=(description);
                }
                meta name="viewport" content=(VIEWPORT);
                meta name="apple-mobile-web-app-capable" content="yes";
                meta name="apple-mobile-web-app-status-bar-style" content="black";
                meta name="mobile-web-app-capable" content="yes";
                meta http-equiv="Content-Type" content="text/html;charset=utf-8";
                meta http-equiv="x-ua-compatible" content="IE=edge";
                style { (PreEscaped(PAGE_CSS)) }
            }
            body {
                script src=(viewer_script) {}
                div id="pano" style="width:100%;height:100%;" {
                    noscript {
                        table style="width:100%;height:100%;" {
                            tr style="vertical-align:middle;" {
                                td {
                                    div style="text-align:center;" {
                                        "ERROR:" br; br; "Javascript not activated" br; br;
                                    }
                                }
                            }
                        }
                    }
                    script { (PreEscaped(embed_call(&descriptor.pname))) }
                }
            }
        }
    }
}

pub fn page_path(outdir: &Path, pname: &str) -> PathBuf {
    outdir.join(format!("{pname}.html"))
}

/// Write `<outdir>/<pname>.html`, replacing any previous page.
pub fn write(
    descriptor: &SceneDescriptor,
    outdir: &Path,
    viewer_script: &str,
    ctx: &BuildContext,
) -> io::Result<PathBuf> {
    fs::create_dir_all(outdir)?;
    let path = page_path(outdir, &descriptor.pname);
    fs::write(&path, render(descriptor, viewer_script).into_string())?;
    ctx.emit(BuildEvent::PageWritten {
        pname: descriptor.pname.clone(),
        path: path.clone(),
    });
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use tempfile::TempDir;

    #[test]
    fn page_embeds_scene_document() {
        let tmp = TempDir::new().unwrap();
        let d = descriptor_fixture(&tmp, "harbour");
        let html = render(&d, "krpano.js").into_string();

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains(r#"<script src="krpano.js"></script>"#));
        assert!(html.contains(r#"embedpano({xml:"harbour.xml", target:"pano""#));
        assert!(html.contains(r#"<div id="pano""#));
    }

    #[test]
    fn title_falls_back_to_pname() {
        let tmp = TempDir::new().unwrap();
        let d = descriptor_fixture(&tmp, "harbour");
        let html = render(&d, "krpano.js").into_string();
        assert!(html.contains("<title>harbour</title>"));
        assert!(!html.contains(r#"name="description""#));
    }

    #[test]
    fn title_and_description_are_escaped() {
        let tmp = TempDir::new().unwrap();
        let mut d = descriptor_fixture(&tmp, "harbour");
        d.title = Some("Dawn <east>".into());
        d.description = Some("\"quoted\"".into());
        let html = render(&d, "krpano.js").into_string();
        assert!(html.contains("<title>Dawn &lt;east&gt;</title>"));
        assert!(html.contains(r#"content="&quot;quoted&quot;""#));
    }

    #[test]
    fn write_replaces_previous_page() {
        let tmp = TempDir::new().unwrap();
        let outdir = tmp.path().join("out");
        let mut d = descriptor_fixture(&tmp, "harbour");
        let ctx = BuildContext::new();

        write(&d, &outdir, "krpano.js", &ctx).unwrap();
        d.title = Some("Second".into());
        let path = write(&d, &outdir, "krpano.js", &ctx).unwrap();

        assert_eq!(path, outdir.join("harbour.html"));
        assert!(fs::read_to_string(path).unwrap().contains("<title>Second</title>"));
    }
}
