//! 点击归因
//!
//! 将原始请求（query、headers、referer）分类为 source / country / device，
//! 纯函数，无 I/O，任何输入都不会失败，未知输入降级到默认类别。

use std::borrow::Cow;

use woothee::parser::Parser;

use crate::events::DeviceType;

/// 归因结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub source: String,
    pub country: String,
    pub device_type: DeviceType,
}

/// 原始请求材料
///
/// 由调用方（重定向处理器）从请求中摘取，这里不依赖任何 Web 框架类型。
#[derive(Debug, Clone, Copy, Default)]
pub struct RawRequest<'a> {
    /// 原始 query string（不含 `?`）
    pub query: Option<&'a str>,
    /// Referer header
    pub referer: Option<&'a str>,
    /// User-Agent header
    pub user_agent: Option<&'a str>,
    /// 边缘节点注入的国家头（x-vercel-ip-country / cf-ipcountry）
    pub geo_country: Option<&'a str>,
    /// 显式设备提示头（x-device-type）
    pub device_hint: Option<&'a str>,
    /// sec-ch-ua-mobile client hint（"?1" / "?0"）
    pub ch_ua_mobile: Option<&'a str>,
    /// 本站 host，用于判断跨站 referer
    pub host: Option<&'a str>,
}

/// 短域名平台表：必须整域或子域匹配（contains 会误伤，如 max.com 含 "x.com"）
const PLATFORM_DOMAINS: [(&str, &str); 6] = [
    ("t.co", "twitter"),
    ("x.com", "twitter"),
    ("t.me", "telegram"),
    ("fb.me", "facebook"),
    ("youtu.be", "youtube"),
    ("reddit.com", "reddit"),
];

/// 平台名 token 表：域名包含即可（instagram.com、l.instagram.com、lite.facebook.com）
const PLATFORM_NAMES: [&str; 11] = [
    "instagram",
    "whatsapp",
    "facebook",
    "twitter",
    "linkedin",
    "tiktok",
    "youtube",
    "telegram",
    "pinterest",
    "snapchat",
    "reddit",
];

/// 对请求做完整归因（确定性，可重复调用）
pub fn resolve(req: &RawRequest) -> Attribution {
    Attribution {
        source: resolve_source(req),
        country: resolve_country(req.geo_country),
        device_type: resolve_device(req),
    }
}

/// 推导流量来源
///
/// 解析顺序：query 参数 → 已知平台 referer → 跨站 referer → QR 扫描 UA → direct
pub fn resolve_source(req: &RawRequest) -> String {
    // 1. 显式来源参数（src / source / utm_source）
    if let Some(query) = req.query {
        for key in ["src", "source", "utm_source"] {
            if let Some(value) = extract_query_param(query, key)
                && !value.trim().is_empty()
            {
                return normalize_token(value.trim());
            }
        }
    }

    if let Some(referer) = req.referer
        && let Some(domain) = extract_domain(referer)
    {
        let domain_lower = domain.to_lowercase();

        // 2. 已知平台匹配
        for (needle, token) in PLATFORM_DOMAINS {
            if domain_lower == needle || domain_lower.ends_with(&format!(".{}", needle)) {
                return token.to_string();
            }
        }
        for name in PLATFORM_NAMES {
            if domain_lower.contains(name) {
                return name.to_string();
            }
        }

        // 3. 跨站 referer
        let same_host = req
            .host
            .map(|h| h.eq_ignore_ascii_case(&domain_lower))
            .unwrap_or(false);
        if !same_host {
            return "referral".to_string();
        }
    }

    // 4. QR 扫描器 UA
    if let Some(ua) = req.user_agent {
        let ua_lower = ua.to_lowercase();
        if ua_lower.contains("qr") || ua_lower.contains("scanner") {
            return "qr_scan".to_string();
        }
    }

    // 5. 都没有 → direct
    "direct".to_string()
}

/// 推导国家代码
///
/// 只读边缘注入的 geo 头，不做任何 IP 地理定位。
pub fn resolve_country(geo_country: Option<&str>) -> String {
    match geo_country.map(str::trim) {
        Some(code) if !code.is_empty() => code.to_uppercase(),
        _ => "UNKNOWN".to_string(),
    }
}

/// 推导设备类型
///
/// 解析顺序：显式提示头 → sec-ch-ua-mobile → User-Agent 分类 → desktop；
/// 完全没有 User-Agent 时为 unknown。
pub fn resolve_device(req: &RawRequest) -> DeviceType {
    // 1. 显式设备提示头
    if let Some(hint) = req.device_hint
        && let Ok(device) = hint.trim().parse::<DeviceType>()
    {
        return device;
    }

    // 2. client hint："?1" 即移动端；"?0" 仍需区分平板，继续走 UA
    if let Some(hint) = req.ch_ua_mobile
        && hint.trim() == "?1"
    {
        return DeviceType::Mobile;
    }

    let Some(ua) = req.user_agent else {
        return DeviceType::Unknown;
    };

    classify_user_agent(ua)
}

/// 基于 User-Agent 的设备分类
fn classify_user_agent(ua: &str) -> DeviceType {
    let ua_lower = ua.to_lowercase();

    // 平板：显式 token，或 Android 且无 "mobile" 标记
    if ua_lower.contains("ipad") || ua_lower.contains("tablet") || ua_lower.contains("kindle") {
        return DeviceType::Tablet;
    }
    if ua_lower.contains("android") && !ua_lower.contains("mobile") {
        return DeviceType::Tablet;
    }

    // woothee 能识别的按其类别归类
    let parser = Parser::new();
    if let Some(result) = parser.parse(ua) {
        match result.category {
            "smartphone" | "mobilephone" => return DeviceType::Mobile,
            "pc" => return DeviceType::Desktop,
            _ => {}
        }
    }

    if ua_lower.contains("mobile") || ua_lower.contains("iphone") || ua_lower.contains("android") {
        return DeviceType::Mobile;
    }

    DeviceType::Desktop
}

/// 从 query string 提取指定参数值
#[inline]
fn extract_query_param<'a>(query: &'a str, key: &str) -> Option<Cow<'a, str>> {
    for part in query.split('&') {
        if let Some(value) = part.strip_prefix(key).and_then(|s| s.strip_prefix('=')) {
            // urlencoding::decode 返回 Cow，未编码时零分配
            return urlencoding::decode(value).ok();
        }
    }
    None
}

/// 从 URL 提取域名
#[inline]
fn extract_domain(url: &str) -> Option<&str> {
    // 简单解析：找 :// 后的域名部分
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);

    // 取到第一个 / 或 : 或 ? 或 # 为止
    without_scheme
        .split(&['/', ':', '?', '#'][..])
        .next()
        .filter(|s| !s.is_empty())
}

/// 来源 token 标准化：小写，非单词字符替换为 `_`
fn normalize_token(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
