//! 아티팩트 경로에서 표시 이름과 좌표를 유도합니다.
//!
//! ```text
//! /opt/app/lib/log4j-core-2.14.1.jar  ->  이름 "log4j-core", 버전 "2.14.1"
//! C:\app\guava-31.1-jre.jar            ->  이름 "guava",      버전 "31.1-jre"
//! ```
//!
//! 아티팩트 바이트는 읽지 않습니다. 그룹 ID는 파일 이름으로 알 수 없습니다.

use std::sync::LazyLock;

use regex::Regex;

/// 아카이브 확장자
const ARCHIVE_SUFFIXES: [&str; 3] = [".jar", ".war", ".ear"];

/// `<name>-<version>` 형태의 파일 이름을 나누는 정규식
static VERSION_SUFFIX: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>.+?)[-_]v?(?P<version>\d+(?:[.\-_][0-9A-Za-z]+)*)$").ok()
});

/// 경로 접두어와 아카이브 확장자를 제거한 파일 이름
fn file_stem(path: &str) -> &str {
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let lower = file.to_ascii_lowercase();
    for suffix in ARCHIVE_SUFFIXES {
        if lower.ends_with(suffix) {
            return &file[..file.len() - suffix.len()];
        }
    }
    file
}

fn split_version(stem: &str) -> Option<(&str, &str)> {
    let re = VERSION_SUFFIX.as_ref()?;
    let caps = re.captures(stem)?;
    Some((caps.name("name")?.as_str(), caps.name("version")?.as_str()))
}

/// 표시 이름을 유도합니다.
///
/// 경로 접두어, 아카이브 확장자, 끝의 버전 패턴을 제거합니다.
/// 결과가 비면 원래 파일 이름을 사용합니다.
pub fn display_name(path: &str) -> String {
    let stem = file_stem(path.trim());
    let name = split_version(stem).map_or(stem, |(name, _)| name);
    if name.is_empty() {
        stem.to_owned()
    } else {
        name.to_owned()
    }
}

/// 파일 이름에서 (artifact id, version)을 유도합니다.
///
/// 버전 접미사가 없으면 artifact id만 반환합니다.
pub fn coordinates(path: &str) -> (Option<String>, Option<String>) {
    let stem = file_stem(path.trim());
    if stem.is_empty() {
        return (None, None);
    }
    match split_version(stem) {
        Some((name, version)) => (Some(name.to_owned()), Some(version.to_owned())),
        None => (Some(stem.to_owned()), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_prefix_suffix_and_version() {
        assert_eq!(display_name("/opt/lib/log4j-core-2.14.1.jar"), "log4j-core");
        assert_eq!(display_name("commons-lang3-3.12.0.jar"), "commons-lang3");
        assert_eq!(display_name(r"C:\app\lib\guava-31.1-jre.jar"), "guava");
        assert_eq!(
            display_name("/srv/spring-core-5.3.20.RELEASE.jar"),
            "spring-core"
        );
    }

    #[test]
    fn handles_war_and_uppercase_suffix() {
        assert_eq!(display_name("/deploy/shop-1.0.WAR"), "shop");
        assert_eq!(display_name("/deploy/admin.ear"), "admin");
    }

    #[test]
    fn keeps_name_without_version() {
        assert_eq!(display_name("/lib/tools.jar"), "tools");
        assert_eq!(display_name("mylib-2x.jar"), "mylib-2x");
    }

    #[test]
    fn underscore_and_v_prefix_versions() {
        assert_eq!(display_name("netty_v4.1.77.jar"), "netty");
    }

    #[test]
    fn coordinates_from_filename() {
        assert_eq!(
            coordinates("/opt/lib/jackson-databind-2.13.4.2.jar"),
            (
                Some("jackson-databind".to_owned()),
                Some("2.13.4.2".to_owned())
            )
        );
        assert_eq!(
            coordinates("/lib/tools.jar"),
            (Some("tools".to_owned()), None)
        );
        assert_eq!(coordinates("/lib/"), (None, None));
    }
}
