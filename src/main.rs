use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{
        HeaderMap, HeaderValue, Method, StatusCode,
        header::{ACCEPT, CONTENT_DISPOSITION, CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT},
    },
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::{SecondsFormat, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

#[derive(Clone)]
struct AppState {
    http_client: reqwest::Client,
}

const METADATA_TIMEOUT_SECONDS: u64 = 15;
const MEDIA_PROXY_TIMEOUT_SECONDS: u64 = 30;
const MAX_TITLE_TOKENS: usize = 14;
const DEFAULT_TITLE: &str = "TikTok Video";
const DEFAULT_MUSIC_TITLE: &str = "Original Sound";
const DEFAULT_MUSIC_AUTHOR: &str = "Unknown Artist";
const DEFAULT_AUTHOR_NAME: &str = "Unknown User";
const DEFAULT_AUTHOR_ID: &str = "unknown";
const PLACEHOLDER_AVATAR_URL: &str =
    "https://ui-avatars.com/api/?name=TikTok&background=667eea&color=fff&size=128";
const PLATFORM_HOST_MARKER: &str = "tiktok.com";
const PLATFORM_REFERER: &str = "https://www.tiktok.com/";
const IMAGE_ACCEPT: &str = "image/webp,image/apng,image/*,*/*;q=0.8";
const VIDEO_ACCEPT: &str = "video/mp4,video/webm,video/*;q=0.9,*/*;q=0.8";

struct UpstreamProvider {
    name: &'static str,
    endpoint: &'static str,
    origin: &'static str,
    referer: &'static str,
}

// Ordered by priority; the fetch loop short-circuits on the first success.
const UPSTREAM_PROVIDERS: &[UpstreamProvider] = &[UpstreamProvider {
    name: "TikWM",
    endpoint: "https://www.tikwm.com/api/",
    origin: "https://www.tikwm.com",
    referer: "https://www.tikwm.com/",
}];

// Browser identities rotated across outbound requests, one uniform pick per call.
const USER_AGENTS: &[&str] = &[
    // mobile
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPhone14,3; U; CPU iPhone OS 15_0 like Mac OS X) AppleWebKit/602.1.50 (KHTML, like Gecko) Version/15.0 Mobile/19A346 Safari/602.1",
    "Mozilla/5.0 (iPhone14,6; U; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 13; SM-S918B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 14; SM-S928B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-G991B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 12; Pixel 6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 11; SM-G960F) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-S901B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-F936B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-X800) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-X806B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Linux; Android 12; SM-T870) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Linux; Android 11; SM-T500) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Linux; Android 10; HD1913) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; IN2023) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; CPH2581) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 22081212UG) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 23021RAA2Y) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 2201117TY) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 2203121C) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 2107113SG) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 2201123G) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 220333QL) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 22071212AG) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 2201116SG) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 22081283G) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 2201116TI) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 2203129C) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 2207122MC) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 22081212UC) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 220333QAG) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 2201122C) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 2201117TI) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 22071212AC) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 2203121C) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 2201116U) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 22081283C) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 220333QNY) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 22071212AI) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 2201116SG) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 22081212UG) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 220333QAG) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; 2207122MC) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    // desktop
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 11.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 11_0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 12_0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Fedora; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/118.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/119.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:109.0) Gecko/20100101 Firefox/118.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:109.0) Gecko/20100101 Firefox/119.0",
    "Mozilla/5.0 (X11; Linux i686; rv:109.0) Gecko/20100101 Firefox/118.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/118.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/118.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/117.0.2045.47",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/118.0.2088.76",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/119.0.2151.72",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Edge/117.0.2045.47",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Edge/118.0.2088.76",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36 OPR/102.0.0.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36 OPR/103.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36 OPR/102.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36 OPR/103.0.0.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36 OPR/102.0.0.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36 OPR/103.0.0.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36 Vivaldi/6.1.3035.111",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36 Vivaldi/6.2.3105.47",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36 Vivaldi/6.1.3035.111",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36 Vivaldi/6.2.3105.47",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36 Vivaldi/6.1.3035.111",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36 Vivaldi/6.2.3105.47",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36 Whale/3.21.192.22",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36 Whale/3.22.198.47",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36 Whale/3.21.192.22",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36 Whale/3.22.198.47",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36 Edg/117.0.2045.47",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36 Edg/118.0.2088.76",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36 Edg/117.0.2045.47",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36 Edg/118.0.2088.76",
    // in-app and niche browsers
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) SamsungBrowser/22.0 Chrome/112.0.5615.48 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) SamsungBrowser/23.0 Chrome/113.0.5672.53 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) SamsungBrowser/24.0 Chrome/114.0.5735.60 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 (KHTML, like Gecko) SamsungBrowser/22.0 Chrome/112.0.5615.48 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 OPR/73.3.3216.58675",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 OPR/74.3.3316.58675",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 EdgiOS/112.1722.70 Mobile/15E148 Safari/605.1.15",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 EdgiOS/118.1822.70 Mobile/15E148 Safari/605.1.15",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 Vivaldi/6.1.3035.111",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 Vivaldi/6.2.3105.47",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 Whale/3.21.192.22",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 Whale/3.22.198.47",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/112.0.5615.46 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/118.0.5993.46 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 GSA/112.0.5615.46",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 GSA/118.0.5993.46",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 MicroMessenger/8.0.40",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 MicroMessenger/8.0.42",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 MicroMessenger/8.0.40",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 MicroMessenger/8.0.42",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 Instagram 292.0.0.0.0",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 Instagram 293.0.0.0.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 Instagram 292.0.0.0.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 Instagram 293.0.0.0.0",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 Facebook/392.0.0.0.0",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 Facebook/393.0.0.0.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 Facebook/392.0.0.0.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 Facebook/393.0.0.0.0",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 Snapchat/12.0.0.0",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 Snapchat/12.1.0.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 Snapchat/12.0.0.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 Snapchat/12.1.0.0",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 Twitter/9.0.0",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 Twitter/9.1.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 Twitter/9.0.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 Twitter/9.1.0",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 LinkedIn/5.0.0",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 LinkedIn/5.1.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 LinkedIn/5.0.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 LinkedIn/5.1.0",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 Pinterest/0.0.0",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 Pinterest/0.1.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 Pinterest/0.0.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 Pinterest/0.1.0",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 WhatsApp/2.0.0",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 WhatsApp/2.1.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 WhatsApp/2.0.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 WhatsApp/2.1.0",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 Telegram/9.0.0",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36 Telegram/9.1.0",
];

#[derive(Debug, Deserialize)]
struct DownloadRequest {
    url: Option<String>,
}

#[derive(Debug, Serialize)]
struct DownloadSuccess {
    success: bool,
    #[serde(flatten)]
    media: MediaSummary,
}

#[derive(Debug, Serialize)]
struct DownloadFailure {
    success: bool,
    error: String,
}

#[derive(Debug, Serialize)]
struct MediaSummary {
    title: String,
    filename: String,
    created: i64,
    music: MusicInfo,
    stats: EngagementStats,
    author: AuthorInfo,
    #[serde(flatten)]
    payload: MediaPayload,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum MediaPayload {
    Video { video: VideoSection },
    Photos { photos: PhotoSection },
}

#[derive(Debug, Serialize)]
struct VideoSection {
    qualities: Vec<MediaQuality>,
    duration: u64,
    cover: String,
    hd_available: bool,
}

#[derive(Debug, Serialize)]
struct PhotoSection {
    images: Vec<ImageItem>,
    count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    cover: Option<String>,
    all_images_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_download: Option<VideoDownload>,
}

#[derive(Debug, Serialize)]
struct MediaQuality {
    #[serde(rename = "type")]
    kind: QualityKind,
    url: String,
    label: &'static str,
    is_hd: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
enum QualityKind {
    Hd,
    Standard,
}

#[derive(Debug, Serialize)]
struct ImageItem {
    id: usize,
    url: String,
    thumbnail: String,
    download_url: String,
}

// Photo posts can still carry a synthetic video rendition of the gallery.
#[derive(Debug, Serialize)]
struct VideoDownload {
    hd: String,
    standard: String,
    has_music: bool,
    music_title: String,
}

#[derive(Debug, Serialize)]
struct MusicInfo {
    title: String,
    author: String,
    url: String,
    cover: String,
}

#[derive(Debug, Serialize)]
struct EngagementStats {
    likes: String,
    comments: String,
    shares: String,
    views: String,
    downloads: String,
    followers: String,
}

#[derive(Debug, Serialize)]
struct AuthorInfo {
    id: String,
    name: String,
    avatar: String,
    verified: bool,
    followers: String,
}

#[derive(Debug, Deserialize)]
struct DirectDownloadParams {
    url: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    quality: Option<String>,
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DownloadAllImagesParams {
    urls: Option<String>,
    filename: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

#[derive(Debug)]
enum FetchError {
    Transport(String),
    AllProvidersFailed(Vec<String>),
}

impl FetchError {
    fn detail(&self) -> String {
        match self {
            Self::Transport(reason) => reason.clone(),
            Self::AllProvidersFailed(reasons) => reasons.join("; "),
        }
    }

    fn user_message(&self) -> &'static str {
        "Service temporarily unavailable. Please try again."
    }
}

#[derive(Debug, PartialEq)]
enum NormalizeError {
    NoMediaData,
}

impl NormalizeError {
    fn user_message(&self) -> &'static str {
        match self {
            Self::NoMediaData => "No media data found in API response",
        }
    }
}

// Upstream payload shapes. Every field is optional; the normalizer supplies defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct UpstreamMedia {
    title: Option<String>,
    duration: Option<u64>,
    play: Option<String>,
    hdplay: Option<String>,
    cover: Option<String>,
    images: Option<Vec<String>>,
    music_info: Option<UpstreamMusic>,
    digg_count: Option<CountValue>,
    comment_count: Option<CountValue>,
    share_count: Option<CountValue>,
    play_count: Option<CountValue>,
    download_count: Option<CountValue>,
    create_time: Option<i64>,
    author: Option<UpstreamAuthor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct UpstreamMusic {
    title: Option<String>,
    author: Option<String>,
    play: Option<String>,
    cover: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct UpstreamAuthor {
    unique_id: Option<String>,
    nickname: Option<String>,
    avatar: Option<String>,
    verified: Option<VerifiedFlag>,
    follower_count: Option<CountValue>,
}

// Counters arrive as numbers or preformatted strings depending on the upstream mood.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum CountValue {
    Text(String),
    Number(f64),
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum VerifiedFlag {
    Bool(bool),
    Number(i64),
}

impl VerifiedFlag {
    fn is_set(self) -> bool {
        match self {
            Self::Bool(value) => value,
            Self::Number(value) => value == 1,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "tikrelay=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {}", error.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    let http_client = reqwest::Client::builder()
        .build()
        .map_err(|error| ApiError::internal(format!("Could not build HTTP client: {error}")))?;

    let state = AppState { http_client };

    let app = build_router(state)
        .layer(build_cors_layer())
        .layer(TraceLayer::new_for_http());

    let addr = resolve_bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|error| ApiError::internal(format!("Could not bind {addr}: {error}")))?;

    info!("TikTok relay listening on http://{addr}");

    axum::serve(listener, app)
        .await
        .map_err(|error| ApiError::internal(format!("HTTP server error: {error}")))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/download", post(download_media))
        .route("/api/direct-download", get(direct_download))
        .route("/api/download-all-images", get(download_all_images))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "OK",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

async fn download_media(
    State(state): State<AppState>,
    Json(payload): Json<DownloadRequest>,
) -> Response {
    let url = payload.url.as_deref().map(str::trim).unwrap_or_default();
    if url.is_empty() {
        return failure_response("TikTok URL is required");
    }
    if !is_tiktok_url(url) {
        return failure_response("Please enter a valid TikTok URL");
    }

    info!("Processing TikTok URL: {url}");

    let raw = match fetch_metadata(&state.http_client, url).await {
        Ok(raw) => raw,
        Err(error) => {
            warn!("Metadata fetch failed: {}", error.detail());
            return failure_response(error.user_message());
        }
    };

    match normalize(&raw) {
        Ok(media) => Json(DownloadSuccess {
            success: true,
            media,
        })
        .into_response(),
        Err(error) => {
            warn!("Normalization failed for {url}: {error:?}");
            failure_response(error.user_message())
        }
    }
}

fn failure_response(message: impl Into<String>) -> Response {
    Json(DownloadFailure {
        success: false,
        error: message.into(),
    })
    .into_response()
}

async fn direct_download(
    State(state): State<AppState>,
    Query(params): Query<DirectDownloadParams>,
) -> Result<Response, ApiError> {
    let url = params
        .url
        .as_deref()
        .and_then(non_empty)
        .ok_or_else(|| ApiError::bad_request("Media URL is required"))?;

    let is_image = params.kind.as_deref() == Some("image");
    let (content_type, accept, extension) = if is_image {
        ("image/jpeg", IMAGE_ACCEPT, "jpg")
    } else {
        ("video/mp4", VIDEO_ACCEPT, "mp4")
    };

    let display_name = match params.filename.as_deref().and_then(non_empty) {
        Some(filename) => filename.to_string(),
        None if is_image => "tiktok-image".to_string(),
        None => format!(
            "tiktok-video-{}",
            params.quality.as_deref().and_then(non_empty).unwrap_or("hd")
        ),
    };

    let upstream = state
        .http_client
        .get(url)
        .timeout(Duration::from_secs(MEDIA_PROXY_TIMEOUT_SECONDS))
        .header(USER_AGENT, pick_user_agent())
        .header(REFERER, PLATFORM_REFERER)
        .header(ACCEPT, accept)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|error| {
            warn!("Direct download error: {error}");
            ApiError::internal(format!("Download failed: {error}"))
        })?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    let content_disposition = build_content_disposition(&format!("{display_name}.{extension}"));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition)
            .map_err(|_| ApiError::internal("Download failed: invalid download filename"))?,
    );

    Ok((headers, Body::from_stream(upstream.bytes_stream())).into_response())
}

async fn download_all_images(
    Query(params): Query<DownloadAllImagesParams>,
) -> Result<Redirect, ApiError> {
    let encoded = params
        .urls
        .as_deref()
        .and_then(non_empty)
        .ok_or_else(|| ApiError::bad_request("Image URLs are required"))?;

    let image_urls: Vec<String> = serde_json::from_str(encoded)
        .map_err(|_| ApiError::bad_request("Image URLs are required"))?;

    let Some(first) = image_urls.first() else {
        return Err(ApiError::bad_request("No images found"));
    };

    let filename = params
        .filename
        .as_deref()
        .and_then(non_empty)
        .unwrap_or("tiktok-images");

    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("url", first)
        .append_pair("type", "image")
        .append_pair("filename", filename)
        .finish();

    Ok(Redirect::temporary(&format!("/api/direct-download?{query}")))
}

async fn fetch_metadata(client: &reqwest::Client, source_url: &str) -> Result<Value, FetchError> {
    let mut failures = Vec::new();

    for provider in UPSTREAM_PROVIDERS {
        info!("Processing with {}", provider.name);
        match query_provider(client, provider, source_url).await {
            Ok(raw) => return Ok(raw),
            Err(error) => {
                let reason = error.detail();
                warn!("{} failed: {reason}", provider.name);
                failures.push(format!("{}: {reason}", provider.name));
            }
        }
    }

    Err(FetchError::AllProvidersFailed(failures))
}

async fn query_provider(
    client: &reqwest::Client,
    provider: &UpstreamProvider,
    source_url: &str,
) -> Result<Value, FetchError> {
    let response = client
        .post(provider.endpoint)
        .timeout(Duration::from_secs(METADATA_TIMEOUT_SECONDS))
        .header(USER_AGENT, pick_user_agent())
        .header(ACCEPT, "application/json")
        .header(ORIGIN, provider.origin)
        .header(REFERER, provider.referer)
        .header("x-requested-with", "XMLHttpRequest")
        .form(&[("url", source_url)])
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|error| FetchError::Transport(error.to_string()))?;

    response
        .json::<Value>()
        .await
        .map_err(|error| FetchError::Transport(error.to_string()))
}

fn normalize(raw: &Value) -> Result<MediaSummary, NormalizeError> {
    let data = raw.get("data").cloned().ok_or(NormalizeError::NoMediaData)?;
    let data: UpstreamMedia =
        serde_json::from_value(data).map_err(|_| NormalizeError::NoMediaData)?;

    let images = data.images.clone().unwrap_or_default();
    let is_photo_post = !images.is_empty();

    // Empty strings from the upstream behave like absent fields.
    let play = data.play.as_deref().and_then(non_empty);
    let hd_source = data.hdplay.as_deref().and_then(non_empty).or(play);

    let mut qualities = Vec::new();
    if let Some(hd_url) = hd_source {
        qualities.push(MediaQuality {
            kind: QualityKind::Hd,
            url: hd_url.to_string(),
            label: "HD Quality",
            is_hd: true,
        });
    }
    if let Some(play_url) = play
        && hd_source != Some(play_url)
    {
        qualities.push(MediaQuality {
            kind: QualityKind::Standard,
            url: play_url.to_string(),
            label: "Standard Quality",
            is_hd: false,
        });
    }

    let has_background_music = data.music_info.is_some();
    let music_source = data.music_info.clone().unwrap_or_default();
    let music = MusicInfo {
        title: music_source
            .title
            .as_deref()
            .and_then(non_empty)
            .unwrap_or(DEFAULT_MUSIC_TITLE)
            .to_string(),
        author: music_source
            .author
            .as_deref()
            .and_then(non_empty)
            .unwrap_or(DEFAULT_MUSIC_AUTHOR)
            .to_string(),
        url: music_source.play.clone().unwrap_or_default(),
        cover: music_source.cover.clone().unwrap_or_default(),
    };

    let video_download = match (is_photo_post, play) {
        (true, Some(play_url)) => Some(VideoDownload {
            hd: hd_source.unwrap_or(play_url).to_string(),
            standard: play_url.to_string(),
            has_music: has_background_music,
            music_title: music.title.clone(),
        }),
        _ => None,
    };

    let author_source = data.author.clone().unwrap_or_default();
    let follower_display = format_follower_count(author_source.follower_count.as_ref());
    let author = AuthorInfo {
        id: author_source
            .unique_id
            .as_deref()
            .and_then(non_empty)
            .unwrap_or(DEFAULT_AUTHOR_ID)
            .to_string(),
        name: author_source
            .nickname
            .as_deref()
            .and_then(non_empty)
            .unwrap_or(DEFAULT_AUTHOR_NAME)
            .to_string(),
        avatar: author_source
            .avatar
            .as_deref()
            .and_then(non_empty)
            .unwrap_or(PLACEHOLDER_AVATAR_URL)
            .to_string(),
        verified: author_source
            .verified
            .map(VerifiedFlag::is_set)
            .unwrap_or(false),
        followers: follower_display.clone(),
    };

    let stats = EngagementStats {
        likes: format_count(data.digg_count.as_ref()),
        comments: format_count(data.comment_count.as_ref()),
        shares: format_count(data.share_count.as_ref()),
        views: format_count(data.play_count.as_ref()),
        downloads: format_count(data.download_count.as_ref()),
        followers: follower_display,
    };

    let title = data
        .title
        .as_deref()
        .and_then(non_empty)
        .unwrap_or(DEFAULT_TITLE)
        .to_string();
    let duration = data.duration.unwrap_or(0);
    let filename = generate_filename(&title, duration);
    let created = data.create_time.unwrap_or(0);

    let payload = if is_photo_post {
        let image_items: Vec<ImageItem> = images
            .iter()
            .enumerate()
            .map(|(index, url)| ImageItem {
                id: index + 1,
                url: url.clone(),
                thumbnail: url.clone(),
                download_url: url.clone(),
            })
            .collect();

        MediaPayload::Photos {
            photos: PhotoSection {
                count: image_items.len(),
                cover: image_items
                    .first()
                    .map(|item| item.url.clone())
                    .or_else(|| data.cover.clone()),
                all_images_urls: images.clone(),
                images: image_items,
                video_download,
            },
        }
    } else {
        MediaPayload::Video {
            video: VideoSection {
                qualities,
                duration,
                cover: data
                    .cover
                    .as_deref()
                    .and_then(non_empty)
                    .unwrap_or(PLACEHOLDER_AVATAR_URL)
                    .to_string(),
                hd_available: hd_source.is_some(),
            },
        }
    };

    Ok(MediaSummary {
        title,
        filename,
        created,
        music,
        stats,
        author,
        payload,
    })
}

fn is_tiktok_url(value: &str) -> bool {
    value.contains(PLATFORM_HOST_MARKER)
}

fn pick_user_agent() -> &'static str {
    USER_AGENTS[rand::thread_rng().gen_range(0..USER_AGENTS.len())]
}

fn placeholder_follower_count() -> u64 {
    rand::thread_rng().gen_range(1_000..=1_000_000)
}

fn format_count(value: Option<&CountValue>) -> String {
    match value {
        Some(CountValue::Text(text)) => text.clone(),
        Some(CountValue::Number(count)) => format_numeric_count(*count),
        None => format_numeric_count(0.0),
    }
}

fn format_follower_count(value: Option<&CountValue>) -> String {
    match value {
        Some(CountValue::Text(text)) => text.clone(),
        Some(CountValue::Number(count)) if *count > 0.0 => format_numeric_count(*count),
        _ => format_numeric_count(placeholder_follower_count() as f64),
    }
}

fn format_numeric_count(count: f64) -> String {
    let count = count.max(0.0);
    if count >= 1_000_000.0 {
        format!("{:.1}M", count / 1_000_000.0)
    } else if count >= 1_000.0 {
        format!("{:.1}K", count / 1_000.0)
    } else {
        (count as u64).to_string()
    }
}

fn generate_filename(title: &str, duration_seconds: u64) -> String {
    let cleaned: String = title
        .chars()
        .filter(|character| {
            character.is_ascii_alphanumeric() || *character == '_' || character.is_whitespace()
        })
        .collect();
    let stem = cleaned
        .split_whitespace()
        .take(MAX_TITLE_TOKENS)
        .collect::<Vec<_>>()
        .join(" ");

    let minutes = duration_seconds / 60;
    let seconds = duration_seconds % 60;
    let time_tag = if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    };

    format!("{stem}_{time_tag}").replace(' ', "_")
}

fn build_content_disposition(filename: &str) -> String {
    let safe_ascii = sanitize_ascii_filename(filename);
    format!(
        "attachment; filename=\"{safe_ascii}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

fn sanitize_ascii_filename(value: &str) -> String {
    let mut sanitized = String::with_capacity(value.len());

    for character in value.chars() {
        if character.is_ascii_alphanumeric() || matches!(character, '.' | '-' | '_' | ' ') {
            sanitized.push(character);
        } else {
            sanitized.push('_');
        }
    }

    let compact = sanitized.trim();
    if compact.is_empty() {
        "download".to_string()
    } else {
        compact.to_string()
    }
}

fn resolve_bind_addr() -> String {
    if let Some(configured) = std::env::var("APP_ADDR")
        .ok()
        .and_then(|value| non_empty(&value).map(ToString::to_string))
    {
        return configured;
    }

    if let Some(port) = std::env::var("PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
    {
        return format!("0.0.0.0:{port}");
    }

    "127.0.0.1:3000".to_string()
}

fn build_cors_layer() -> CorsLayer {
    let configured = std::env::var("ALLOWED_ORIGINS")
        .ok()
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if configured.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let mut origins = Vec::new();
    for origin in &configured {
        match HeaderValue::from_str(origin) {
            Ok(value) => origins.push(value),
            Err(_) => warn!("Ignoring invalid origin in ALLOWED_ORIGINS: {origin}"),
        }
    }

    info!("CORS allow-list loaded with {} origin(s)", origins.len());

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, header::LOCATION};
    use serde_json::json;
    use tower::ServiceExt;

    fn test_app() -> Router {
        build_router(AppState {
            http_client: reqwest::Client::new(),
        })
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn format_count_abbreviates_thousands_and_millions() {
        assert_eq!(format_count(Some(&CountValue::Number(950.0))), "950");
        assert_eq!(format_count(Some(&CountValue::Number(1_500.0))), "1.5K");
        assert_eq!(format_count(Some(&CountValue::Number(2_500_000.0))), "2.5M");
    }

    #[test]
    fn format_count_passes_textual_values_through() {
        assert_eq!(
            format_count(Some(&CountValue::Text("N/A".to_string()))),
            "N/A"
        );
    }

    #[test]
    fn format_count_clamps_missing_and_negative_values() {
        assert_eq!(format_count(None), "0");
        assert_eq!(format_count(Some(&CountValue::Number(-5.0))), "0");
    }

    #[test]
    fn follower_placeholder_stays_in_range() {
        for _ in 0..64 {
            let placeholder = placeholder_follower_count();
            assert!((1_000..=1_000_000).contains(&placeholder));
        }
    }

    #[test]
    fn follower_count_formats_real_values() {
        assert_eq!(
            format_follower_count(Some(&CountValue::Number(2_500.0))),
            "2.5K"
        );
        assert_eq!(
            format_follower_count(Some(&CountValue::Text("12K".to_string()))),
            "12K"
        );
    }

    #[test]
    fn filename_strips_punctuation_and_appends_duration() {
        assert_eq!(
            generate_filename("Hello, World!! Test", 125),
            "Hello_World_Test_2m5s"
        );
    }

    #[test]
    fn filename_caps_title_at_fourteen_tokens() {
        let title = (1..=20).map(|n| n.to_string()).collect::<Vec<_>>().join(" ");
        assert_eq!(
            generate_filename(&title, 0),
            "1_2_3_4_5_6_7_8_9_10_11_12_13_14_0s"
        );
    }

    #[test]
    fn filename_handles_missing_duration() {
        assert_eq!(generate_filename(DEFAULT_TITLE, 0), "TikTok_Video_0s");
    }

    #[test]
    fn normalize_rejects_payload_without_data() {
        assert_eq!(
            normalize(&json!({})).unwrap_err(),
            NormalizeError::NoMediaData
        );
        assert_eq!(
            normalize(&json!({"data": null})).unwrap_err(),
            NormalizeError::NoMediaData
        );
        assert_eq!(
            normalize(&json!({"code": -1, "msg": "url invalid"})).unwrap_err(),
            NormalizeError::NoMediaData
        );
    }

    #[test]
    fn normalize_builds_video_result() {
        let media = normalize(&json!({
            "data": {"title": "Cat", "duration": 65, "play": "u1", "hdplay": "u1"}
        }))
        .unwrap();

        assert_eq!(media.title, "Cat");
        assert_eq!(media.filename, "Cat_1m5s");
        match &media.payload {
            MediaPayload::Video { video } => {
                assert_eq!(video.qualities.len(), 1);
                assert_eq!(video.qualities[0].kind, QualityKind::Hd);
                assert_eq!(video.qualities[0].url, "u1");
                assert!(video.qualities[0].is_hd);
                assert_eq!(video.duration, 65);
                assert!(video.hd_available);
            }
            MediaPayload::Photos { .. } => panic!("expected a video result"),
        }
    }

    #[test]
    fn normalize_builds_photo_result() {
        let media = normalize(&json!({
            "data": {"images": ["a", "b"], "title": "Pics"}
        }))
        .unwrap();

        assert_eq!(media.filename, "Pics_0s");
        match &media.payload {
            MediaPayload::Photos { photos } => {
                assert_eq!(photos.count, 2);
                assert_eq!(photos.cover.as_deref(), Some("a"));
                assert_eq!(photos.all_images_urls, vec!["a", "b"]);
                let ids: Vec<usize> = photos.images.iter().map(|image| image.id).collect();
                assert_eq!(ids, vec![1, 2]);
                assert_eq!(photos.images[0].thumbnail, "a");
                assert_eq!(photos.images[0].download_url, "a");
                assert!(photos.video_download.is_none());
            }
            MediaPayload::Video { .. } => panic!("expected a photo result"),
        }
    }

    #[test]
    fn normalize_orders_hd_before_standard() {
        let media = normalize(&json!({
            "data": {"title": "Clip", "play": "standard-url", "hdplay": "hd-url"}
        }))
        .unwrap();

        match &media.payload {
            MediaPayload::Video { video } => {
                assert_eq!(video.qualities.len(), 2);
                assert_eq!(video.qualities[0].kind, QualityKind::Hd);
                assert_eq!(video.qualities[0].url, "hd-url");
                assert_eq!(video.qualities[1].kind, QualityKind::Standard);
                assert_eq!(video.qualities[1].url, "standard-url");
            }
            MediaPayload::Photos { .. } => panic!("expected a video result"),
        }
    }

    #[test]
    fn normalize_never_duplicates_quality_urls() {
        // Without an hdplay URL the play URL is promoted to HD and must not repeat.
        let media = normalize(&json!({
            "data": {"title": "Clip", "play": "only-url"}
        }))
        .unwrap();

        match &media.payload {
            MediaPayload::Video { video } => {
                assert_eq!(video.qualities.len(), 1);
                assert_eq!(video.qualities[0].url, "only-url");
                assert!(video.hd_available);
            }
            MediaPayload::Photos { .. } => panic!("expected a video result"),
        }
    }

    #[test]
    fn normalize_attaches_video_rendition_to_photo_posts() {
        let media = normalize(&json!({
            "data": {
                "images": ["a"],
                "play": "gallery-clip",
                "music_info": {"title": "Song", "author": "Artist"}
            }
        }))
        .unwrap();

        match &media.payload {
            MediaPayload::Photos { photos } => {
                let rendition = photos.video_download.as_ref().unwrap();
                assert_eq!(rendition.hd, "gallery-clip");
                assert_eq!(rendition.standard, "gallery-clip");
                assert!(rendition.has_music);
                assert_eq!(rendition.music_title, "Song");
            }
            MediaPayload::Video { .. } => panic!("expected a photo result"),
        }
        assert_eq!(media.music.author, "Artist");
    }

    #[test]
    fn normalize_applies_defaults_for_sparse_data() {
        let media = normalize(&json!({"data": {}})).unwrap();

        assert_eq!(media.title, "TikTok Video");
        assert_eq!(media.filename, "TikTok_Video_0s");
        assert_eq!(media.created, 0);
        assert_eq!(media.music.title, "Original Sound");
        assert_eq!(media.music.author, "Unknown Artist");
        assert_eq!(media.stats.likes, "0");
        assert_eq!(media.author.id, "unknown");
        assert_eq!(media.author.name, "Unknown User");
        assert_eq!(media.author.avatar, PLACEHOLDER_AVATAR_URL);
        assert!(!media.author.verified);
        match &media.payload {
            MediaPayload::Video { video } => {
                assert!(video.qualities.is_empty());
                assert!(!video.hd_available);
                assert_eq!(video.cover, PLACEHOLDER_AVATAR_URL);
            }
            MediaPayload::Photos { .. } => panic!("expected a video result"),
        }
    }

    #[test]
    fn normalize_reads_verified_flag_as_bool_or_integer() {
        let verified = |value: Value| {
            normalize(&json!({"data": {"author": {"verified": value}}}))
                .unwrap()
                .author
                .verified
        };

        assert!(verified(json!(true)));
        assert!(verified(json!(1)));
        assert!(!verified(json!(false)));
        assert!(!verified(json!(0)));
    }

    #[test]
    fn normalize_formats_engagement_counts() {
        let media = normalize(&json!({
            "data": {
                "digg_count": 1_500,
                "comment_count": 950,
                "share_count": 2_500_000,
                "play_count": "1.2B",
                "download_count": 0
            }
        }))
        .unwrap();

        assert_eq!(media.stats.likes, "1.5K");
        assert_eq!(media.stats.comments, "950");
        assert_eq!(media.stats.shares, "2.5M");
        assert_eq!(media.stats.views, "1.2B");
        assert_eq!(media.stats.downloads, "0");
    }

    #[test]
    fn tiktok_url_check_requires_platform_host() {
        assert!(is_tiktok_url("https://www.tiktok.com/@user/video/1"));
        assert!(is_tiktok_url("https://vm.tiktok.com/ZM1234/"));
        assert!(!is_tiktok_url("https://example.com/video"));
    }

    #[test]
    fn user_agent_pick_draws_from_the_pool() {
        for _ in 0..32 {
            assert!(USER_AGENTS.contains(&pick_user_agent()));
        }
    }

    #[test]
    fn content_disposition_is_header_safe() {
        let header = build_content_disposition("Cat \"video\" ✨.mp4");
        assert!(HeaderValue::from_str(&header).is_ok());
        assert!(header.starts_with("attachment; filename=\"Cat _video_ _.mp4\""));
    }

    #[tokio::test]
    async fn health_reports_ok_with_timestamp() {
        let response = test_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let value = body_json(response).await;
        assert_eq!(value["status"], "OK");
        assert!(value["timestamp"].is_string());
    }

    #[tokio::test]
    async fn download_rejects_missing_url() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/download")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let value = body_json(response).await;
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"], "TikTok URL is required");
    }

    #[tokio::test]
    async fn download_rejects_non_tiktok_url_without_outbound_call() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/download")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"url": "https://example.com/video"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let value = body_json(response).await;
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"], "Please enter a valid TikTok URL");
    }

    #[tokio::test]
    async fn direct_download_requires_media_url() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/api/direct-download")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let value = body_json(response).await;
        assert_eq!(value["error"], "Media URL is required");
    }

    #[tokio::test]
    async fn download_all_images_redirects_to_first_image() {
        let uri = "/api/download-all-images?urls=%5B%22https%3A%2F%2Fcdn.example.com%2Fa.jpg%22%2C%22https%3A%2F%2Fcdn.example.com%2Fb.jpg%22%5D&filename=pics";
        let response = test_app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = response.headers().get(LOCATION).unwrap().to_str().unwrap();
        assert_eq!(
            location,
            "/api/direct-download?url=https%3A%2F%2Fcdn.example.com%2Fa.jpg&type=image&filename=pics"
        );
    }

    #[tokio::test]
    async fn download_all_images_rejects_empty_list() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/api/download-all-images?urls=%5B%5D")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let value = body_json(response).await;
        assert_eq!(value["error"], "No images found");
    }

    #[tokio::test]
    async fn download_all_images_requires_url_list() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/api/download-all-images")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let value = body_json(response).await;
        assert_eq!(value["error"], "Image URLs are required");
    }
}
