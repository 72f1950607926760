//! App display names mapped to package identifiers, per platform.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::device::Platform;

const ANDROID_APPS: &[(&str, &str)] = &[
    // Social & Messaging
    ("微信", "com.tencent.mm"),
    ("WeChat", "com.tencent.mm"),
    ("QQ", "com.tencent.mobileqq"),
    ("微博", "com.sina.weibo"),
    // E-commerce
    ("淘宝", "com.taobao.taobao"),
    ("京东", "com.jingdong.app.mall"),
    ("拼多多", "com.xunmeng.pinduoduo"),
    ("闲鱼", "com.taobao.idlefish"),
    // Lifestyle
    ("小红书", "com.xingin.xhs"),
    ("豆瓣", "com.douban.frodo"),
    ("知乎", "com.zhihu.android"),
    ("美团", "com.sankuai.meituan"),
    ("大众点评", "com.dianping.v1"),
    ("饿了么", "me.ele"),
    // Maps & Travel
    ("高德地图", "com.autonavi.minimap"),
    ("百度地图", "com.baidu.BaiduMap"),
    ("携程", "ctrip.android.view"),
    ("铁路12306", "com.MobileTicket"),
    ("12306", "com.MobileTicket"),
    ("滴滴出行", "com.sdu.did.psnger"),
    // Video & Music
    ("bilibili", "tv.danmaku.bili"),
    ("抖音", "com.ss.android.ugc.aweme"),
    ("快手", "com.smile.gifmaker"),
    ("腾讯视频", "com.tencent.qqlive"),
    ("爱奇艺", "com.qiyi.video"),
    ("网易云音乐", "com.netease.cloudmusic"),
    ("QQ音乐", "com.tencent.qqmusic"),
    // Productivity
    ("飞书", "com.ss.android.lark"),
    ("QQ邮箱", "com.tencent.androidqqmail"),
    ("豆包", "com.larus.nova"),
    // System & common English names
    ("Settings", "com.android.settings"),
    ("Android System Settings", "com.android.settings"),
    ("Chrome", "com.android.chrome"),
    ("Google Chrome", "com.android.chrome"),
    ("Clock", "com.android.deskclock"),
    ("Contacts", "com.android.contacts"),
    ("Files", "com.android.fileexplorer"),
    ("Gmail", "com.google.android.gm"),
    ("Google Maps", "com.google.android.apps.maps"),
    ("YouTube", "com.google.android.youtube"),
    ("Camera", "com.android.camera"),
    ("Gallery", "com.android.gallery3d"),
    ("Calculator", "com.android.calculator2"),
    ("Calendar", "com.android.calendar"),
    ("Messages", "com.android.mms"),
    ("Phone", "com.android.dialer"),
];

const IOS_APPS: &[(&str, &str)] = &[
    ("微信", "com.tencent.xin"),
    ("WeChat", "com.tencent.xin"),
    ("QQ", "com.tencent.mqq"),
    ("微博", "com.sina.weibo"),
    ("钉钉", "com.laiwang.DingTalk"),
    ("飞书", "com.bytedance.lark"),
    ("淘宝", "com.taobao.taobao4iphone"),
    ("京东", "com.360buy.jdmobile"),
    ("拼多多", "com.xunmeng.pinduoduo"),
    ("闲鱼", "com.taobao.fleamarket"),
    ("美团", "com.meituan.imeituan"),
    ("饿了么", "me.ele.ios.eleme"),
    ("大众点评", "com.dianping.dpscope"),
    ("高德地图", "com.autonavi.amap"),
    ("百度地图", "com.baidu.map"),
    ("滴滴出行", "com.sdu.didi.gsui"),
    ("携程", "com.ctrip.iphone"),
    ("铁路12306", "com.MobileTicket"),
    ("小红书", "com.xingin.discover"),
    ("抖音", "com.ss.iphone.ugc.Aweme"),
    ("快手", "com.kuaishou.nebula"),
    ("哔哩哔哩", "tv.danmaku.bilianime"),
    ("bilibili", "tv.danmaku.bilianime"),
    ("Settings", "com.apple.Preferences"),
    ("设置", "com.apple.Preferences"),
    ("Safari", "com.apple.mobilesafari"),
    ("Photos", "com.apple.mobileslideshow"),
    ("Camera", "com.apple.camera"),
    ("Messages", "com.apple.MobileSMS"),
    ("Calendar", "com.apple.mobilecal"),
    ("Clock", "com.apple.mobiletimer"),
    ("Maps", "com.apple.Maps"),
    ("App Store", "com.apple.AppStore"),
];

const HARMONY_APPS: &[(&str, &str)] = &[
    ("微信", "com.tencent.wechat"),
    ("WeChat", "com.tencent.wechat"),
    ("支付宝", "com.alipay.mobile.client"),
    ("抖音", "com.ss.hm.ugc.aweme"),
    ("美团", "com.sankuai.hmeituan"),
    ("设置", "com.huawei.hmos.settings"),
    ("Settings", "com.huawei.hmos.settings"),
    ("相机", "com.huawei.hmos.camera"),
    ("Camera", "com.huawei.hmos.camera"),
    ("图库", "com.huawei.hmos.photos"),
    ("Gallery", "com.huawei.hmos.photos"),
    ("浏览器", "com.huawei.hmos.browser"),
    ("日历", "com.huawei.hmos.calendar"),
    ("时钟", "com.huawei.hmos.clock"),
    ("计算器", "com.huawei.hmos.calculator"),
    ("备忘录", "com.huawei.hmos.notepad"),
    ("文件管理", "com.huawei.hmos.filemanager"),
];

fn build(table: &'static [(&'static str, &'static str)]) -> HashMap<&'static str, &'static str> {
    table.iter().copied().collect()
}

/// Mapping from app display names to Android package names.
pub static APP_PACKAGES: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| build(ANDROID_APPS));

/// Mapping from app display names to iOS bundle identifiers.
pub static IOS_APP_BUNDLES: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| build(IOS_APPS));

/// Mapping from app display names to HarmonyOS bundle names.
pub static HARMONY_APP_BUNDLES: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| build(HARMONY_APPS));

fn table(platform: Platform) -> &'static HashMap<&'static str, &'static str> {
    match platform {
        Platform::Android => &APP_PACKAGES,
        Platform::Ios => &IOS_APP_BUNDLES,
        Platform::Harmony => &HARMONY_APP_BUNDLES,
    }
}

fn entries(platform: Platform) -> &'static [(&'static str, &'static str)] {
    match platform {
        Platform::Android => ANDROID_APPS,
        Platform::Ios => IOS_APPS,
        Platform::Harmony => HARMONY_APPS,
    }
}

/// Get the package identifier for an app by its display name.
pub fn package_for(platform: Platform, app_name: &str) -> Option<&'static str> {
    let map = table(platform);
    map.get(app_name.trim()).copied().or_else(|| {
        map.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(app_name.trim()))
            .map(|(_, package)| *package)
    })
}

/// Reverse lookup. Returns the first display name listed for the package.
pub fn app_for_package(platform: Platform, package: &str) -> Option<&'static str> {
    entries(platform)
        .iter()
        .find(|(_, p)| *p == package)
        .map(|(name, _)| *name)
}

/// Display names known for a platform, in table order.
pub fn list_supported_apps(platform: Platform) -> Vec<&'static str> {
    entries(platform).iter().map(|(name, _)| *name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_for() {
        assert_eq!(package_for(Platform::Android, "微信"), Some("com.tencent.mm"));
        assert_eq!(package_for(Platform::Ios, "微信"), Some("com.tencent.xin"));
        assert_eq!(package_for(Platform::Android, "chrome"), Some("com.android.chrome"));
        assert_eq!(package_for(Platform::Android, "NonExistent"), None);
    }

    #[test]
    fn test_app_for_package_prefers_first_name() {
        assert_eq!(
            app_for_package(Platform::Android, "com.tencent.mm"),
            Some("微信")
        );
        assert_eq!(app_for_package(Platform::Harmony, "com.example.none"), None);
    }

    #[test]
    fn test_list_supported_apps() {
        let apps = list_supported_apps(Platform::Ios);
        assert_eq!(apps.first(), Some(&"微信"));
        assert_eq!(apps.len(), IOS_APPS.len());
    }
}
