//! `message` 엔트리의 2차 추출
//!
//! 사람이 읽는 접두어를 `": "`에서 잘라내고, 나머지를 이스케이프되지 않은
//! 첫 `=`에서 나눠 key-value 한 쌍을 복원합니다.
//!
//! ```text
//! "Environment Setting: PATH=/usr/bin"  ->  ("PATH", "/usr/bin")
//! ```

/// 디코딩 결과에서 2차 추출을 적용할 키
pub const MESSAGE_KEY: &str = "message";

/// 메시지에서 내장된 key-value 쌍을 추출합니다.
///
/// 키가 비어 있거나 공백을 포함하면 `None`을 반환합니다.
pub fn extract_pair(message: &str) -> Option<(String, String)> {
    let remainder = match message.split_once(": ") {
        Some((_, rest)) => rest,
        None => message,
    };

    let eq = find_unescaped(remainder, '=')?;
    let key = remainder[..eq].trim();
    if key.is_empty() || key.chars().any(char::is_whitespace) {
        return None;
    }

    let value = &remainder[eq + 1..];
    Some((unescape(key), unescape(value)))
}

/// 백슬래시로 이스케이프되지 않은 첫 `target` 문자의 바이트 위치를 찾습니다.
pub(crate) fn find_unescaped(input: &str, target: char) -> Option<usize> {
    let mut escaped = false;
    for (idx, ch) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
        } else if ch == target {
            return Some(idx);
        }
    }
    None
}

/// `\=`와 `\,`를 복원합니다. 다른 백슬래시는 그대로 둡니다.
pub(crate) fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\'
            && let Some(&next) = chars.peek()
            && (next == '=' || next == ',')
        {
            out.push(next);
            chars.next();
            continue;
        }
        out.push(ch);
    }
    out
}
