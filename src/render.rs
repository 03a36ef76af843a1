use std::fmt;
use std::str::FromStr;

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;
use watchpage_streams::FormatDescriptor;

use crate::request::MissingParameter;
use crate::select::FormatNotFound;

/// Localized strings shown to visitors.
pub mod messages {
    use crate::request::{CONTENT_ID_PARAM, FORMAT_SELECTOR_PARAM};
    use crate::select::FormatNotFound;

    pub const ERROR_HEADING: &str = "エラー";
    pub const WATCH_HEADING: &str = "動画再生";
    pub const PLAY_HEADING: &str = "再生";
    pub const FORMATS_HEADING: &str = "フォーマット一覧";
    pub const MISSING_CONTENT_ID: &str = "ビデオID (v) がクエリパラメータに指定されていません。";
    pub const MISSING_FORMAT_SELECTOR: &str =
        "フォーマット (itag) がクエリパラメータに指定されていません。";
    pub const AUDIO_ONLY: &str =
        "選択されたフォーマットは音声のみのため、動画としては再生できません。";
    pub const UPSTREAM_FAILURE: &str = "動画データの取得中にサーバー側でエラーが発生しました。";
    pub const NO_FORMATS: &str = "利用可能なフォーマットが見つかりませんでした。";
    pub const VIDEO_UNSUPPORTED: &str = "お使いのブラウザは動画タグをサポートしていません。";
    pub const AUDIO_UNSUPPORTED: &str = "お使いのブラウザは音声タグをサポートしていません。";
    pub const PLAYBACK_FALLBACK: &str = "再生できませんでした。直接リンク: ";

    /// Message for a missing query parameter.
    pub fn missing_parameter(name: &str) -> &'static str {
        if name == FORMAT_SELECTOR_PARAM {
            MISSING_FORMAT_SELECTOR
        } else {
            MISSING_CONTENT_ID
        }
    }

    /// Usage hint printed under the missing-parameter message.
    pub fn usage_example(name: &str) -> String {
        if name == CONTENT_ID_PARAM {
            "例: /watch?v=xxxxxxxxxxx".to_owned()
        } else {
            format!("例: /watch?v=xxxxxxxxxxx&{name}=18")
        }
    }

    pub fn format_not_found(err: &FormatNotFound) -> String {
        match err {
            FormatNotFound::Fixed(itag) => {
                format!("itag {itag} (高画質) の動画フォーマットが見つかりませんでした。")
            }
            FormatNotFound::Requested(itag) => {
                format!("itag {itag} のフォーマットが見つかりませんでした。")
            }
            FormatNotFound::Empty => NO_FORMATS.to_owned(),
        }
    }
}

const STYLE: &str = "body { font-family: sans-serif; text-align: center; background-color: #f0f0f0; }
.container { max-width: 800px; margin: 40px auto; padding: 20px; background: white; border-radius: 8px; box-shadow: 0 4px 8px rgba(0,0,0,0.1); }
h1 { color: #333; }
.error { color: #d9534f; font-weight: bold; }
.notice { color: #8a6d3b; }
video { width: 100%; height: auto; border-radius: 4px; }
audio { width: 100%; }
.format { text-align: left; border-top: 1px solid #ddd; padding: 12px 0; }
.format a { word-break: break-all; }";

const HLS_SCRIPT_URL: &str = "https://cdn.jsdelivr.net/npm/hls.js@1";

/// Fatal network errors reload the source this many times before the fallback link is shown.
const MAX_NETWORK_RETRIES: u32 = 3;

// `{{SOURCE}}` and `{{FALLBACK}}` are replaced with escaped string literal bodies,
// `{{MAX_RETRIES}}` with `MAX_NETWORK_RETRIES`.
const ADAPTIVE_PLAYER_SCRIPT: &str = r#"(function () {
  var source = "{{SOURCE}}";
  var video = document.getElementById("player");
  var fallback = document.getElementById("fallback");
  function showFallback() {
    fallback.textContent = "{{FALLBACK}}";
    if (/^https?:\/\//i.test(source)) {
      var link = document.createElement("a");
      link.href = source;
      link.textContent = source;
      fallback.appendChild(link);
    } else {
      fallback.appendChild(document.createTextNode(source));
    }
    fallback.hidden = false;
  }
  if (window.Hls && Hls.isSupported()) {
    var hls = new Hls();
    var networkRetries = 0;
    hls.on(Hls.Events.ERROR, function (event, data) {
      if (!data.fatal) {
        return;
      }
      if (data.type === Hls.ErrorTypes.NETWORK_ERROR && networkRetries < {{MAX_RETRIES}}) {
        networkRetries += 1;
        hls.startLoad();
      } else if (data.type === Hls.ErrorTypes.MEDIA_ERROR) {
        hls.recoverMediaError();
      } else {
        hls.destroy();
        video.remove();
        showFallback();
      }
    });
    hls.loadSource(source);
    hls.attachMedia(video);
  } else if (video.canPlayType("application/vnd.apple.mpegurl")) {
    video.src = source;
  } else {
    video.remove();
    showFallback();
  }
})();"#;

/// How the selected media URL is handed to the browser.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayerMode {
    /// A plain `<video src>` element.
    #[default]
    Native,
    /// hls.js drives the `<video>` element and recovers from playback errors.
    Adaptive,
}

impl FromStr for PlayerMode {
    type Err = PlayerModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.eq_ignore_ascii_case("native") {
            return Ok(PlayerMode::Native);
        }

        if value.eq_ignore_ascii_case("adaptive") || value.eq_ignore_ascii_case("hls") {
            return Ok(PlayerMode::Adaptive);
        }

        Err(PlayerModeParseError::InvalidPlayerMode(value.to_owned()))
    }
}

impl fmt::Display for PlayerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerMode::Native => f.write_str("native"),
            PlayerMode::Adaptive => f.write_str("adaptive"),
        }
    }
}

/// Errors encountered while parsing a [`PlayerMode`] from a string.
#[derive(Debug, Error, Clone)]
pub enum PlayerModeParseError {
    #[error("invalid player mode: {0}")]
    InvalidPlayerMode(String),
}

/// Status and HTML body of a rendered page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderResult {
    pub status: StatusCode,
    pub body: String,
}

impl IntoResponse for RenderResult {
    fn into_response(self) -> Response {
        (self.status, Html(self.body)).into_response()
    }
}

/// Escapes a value for an HTML text node or a double-quoted attribute.
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escapes a value for the inside of a JavaScript string literal in an inline `<script>`.
///
/// The result can close neither the literal nor the surrounding script element.
pub fn escape_script_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '<' => out.push_str("\\u003C"),
            '>' => out.push_str("\\u003E"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            ch if ch.is_control() => out.push_str(&format!("\\u{:04X}", ch as u32)),
            _ => out.push(ch),
        }
    }
    out
}

fn is_web_url(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}

/// Renders every page the `/watch` route can produce.
#[derive(Clone, Copy, Debug)]
pub struct PageRenderer<'a> {
    site_name: &'a str,
    player: PlayerMode,
}

impl<'a> PageRenderer<'a> {
    pub fn new(site_name: &'a str, player: PlayerMode) -> Self {
        Self { site_name, player }
    }

    /// 400 page for a request without a required parameter. No content id is echoed.
    pub fn missing_parameter(&self, missing: MissingParameter) -> RenderResult {
        let MissingParameter(name) = missing;
        let body = format!(
            "<h1>{heading}</h1>\n<p class=\"error\">{message}</p>\n<p>{usage}</p>",
            heading = messages::ERROR_HEADING,
            message = messages::missing_parameter(name),
            usage = escape_html(&messages::usage_example(name)),
        );
        self.page(StatusCode::BAD_REQUEST, &body)
    }

    /// Error page for a request that got past validation.
    pub fn error(&self, content_id: &str, status: StatusCode, message: &str) -> RenderResult {
        let body = format!(
            "{header}<p class=\"error\">{heading}: {message}</p>",
            header = self.watch_header(content_id),
            heading = messages::ERROR_HEADING,
            message = escape_html(message),
        );
        self.page(status, &body)
    }

    /// 404 page for a policy that matched nothing.
    pub fn not_found(&self, content_id: &str, err: &FormatNotFound) -> RenderResult {
        self.error(
            content_id,
            StatusCode::NOT_FOUND,
            &messages::format_not_found(err),
        )
    }

    /// Player page for a single rendition.
    pub fn player(&self, content_id: &str, format: &FormatDescriptor) -> RenderResult {
        let player = match self.player {
            PlayerMode::Native => format!(
                "<video controls autoplay src=\"{src}\">\n{unsupported}\n</video>",
                src = escape_html(&format.url),
                unsupported = messages::VIDEO_UNSUPPORTED,
            ),
            PlayerMode::Adaptive => {
                // The source goes in last so text inside the URL is never taken for a placeholder.
                let script = ADAPTIVE_PLAYER_SCRIPT
                    .replace("{{MAX_RETRIES}}", &MAX_NETWORK_RETRIES.to_string())
                    .replace(
                        "{{FALLBACK}}",
                        &escape_script_literal(messages::PLAYBACK_FALLBACK),
                    )
                    .replace("{{SOURCE}}", &escape_script_literal(&format.url));
                format!(
                    "<video id=\"player\" controls autoplay>\n{unsupported}\n</video>\n\
                     <p id=\"fallback\" class=\"error\" hidden></p>\n\
                     <script src=\"{HLS_SCRIPT_URL}\"></script>\n<script>\n{script}\n</script>",
                    unsupported = messages::VIDEO_UNSUPPORTED,
                )
            }
        };

        let body = format!(
            "{header}<h2>{heading}</h2>\n{player}",
            header = self.watch_header(content_id),
            heading = messages::PLAY_HEADING,
        );
        self.page(StatusCode::OK, &body)
    }

    /// Informational page for an audio-only rendition; no video element.
    pub fn audio_only(&self, content_id: &str, format: &FormatDescriptor) -> RenderResult {
        let body = format!(
            "{header}<p class=\"notice\">{message}</p>\n<p>itag {itag} / {resolution}</p>",
            header = self.watch_header(content_id),
            message = messages::AUDIO_ONLY,
            itag = escape_html(format.itag.as_str()),
            resolution = escape_html(format.display_resolution()),
        );
        self.page(StatusCode::OK, &body)
    }

    /// One block per rendition, in the order given.
    pub fn format_list(&self, content_id: &str, formats: &[FormatDescriptor]) -> RenderResult {
        let mut body = self.watch_header(content_id);
        body.push_str(&format!("<h2>{}</h2>\n", messages::FORMATS_HEADING));
        for format in formats {
            body.push_str(&format_block(format));
        }
        self.page(StatusCode::OK, &body)
    }

    fn watch_header(&self, content_id: &str) -> String {
        format!(
            "<h1>{heading}</h1>\n<p><strong>Video ID:</strong> {id}</p>\n",
            heading = messages::WATCH_HEADING,
            id = escape_html(content_id),
        )
    }

    fn page(&self, status: StatusCode, body: &str) -> RenderResult {
        let body = format!(
            "<!DOCTYPE html>\n<html lang=\"ja\">\n<head>\n<meta charset=\"utf-8\">\n\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
             <title>{title}</title>\n<style>\n{STYLE}\n</style>\n</head>\n<body>\n\
             <div class=\"container\">\n{body}\n</div>\n</body>\n</html>\n",
            title = escape_html(self.site_name),
        );
        RenderResult { status, body }
    }
}

fn format_block(format: &FormatDescriptor) -> String {
    let url = escape_html(&format.url);
    let media = if format.is_video_capable() {
        format!(
            "<video controls preload=\"none\" src=\"{url}\">{}</video>",
            messages::VIDEO_UNSUPPORTED
        )
    } else {
        format!(
            "<audio controls preload=\"none\" src=\"{url}\">{}</audio>",
            messages::AUDIO_UNSUPPORTED
        )
    };
    let link = if is_web_url(&format.url) {
        format!("<a href=\"{url}\" target=\"_blank\" rel=\"noopener noreferrer\">{url}</a>")
    } else {
        format!("<span>{url}</span>")
    };

    format!(
        "<section class=\"format\">\n<h3>itag {itag} - {resolution}</h3>\n\
         <p>ext: {ext} / vcodec: {vcodec} / acodec: {acodec}</p>\n{media}\n<p>{link}</p>\n</section>\n",
        itag = escape_html(format.itag.as_str()),
        resolution = escape_html(format.display_resolution()),
        ext = field(&format.ext),
        vcodec = field(&format.vcodec),
        acodec = field(&format.acodec),
    )
}

fn field(value: &Option<String>) -> String {
    escape_html(value.as_deref().unwrap_or("-"))
}
