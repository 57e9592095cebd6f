/*!
Expansion of replacement templates.

A template is literal text with two kinds of special sequences:

* `\c` for any character `c` inserts `c` literally. So `\$` is a dollar sign
and `\\` is a backslash.
* `$n` inserts the text of capture group `n`, where `n` is one or more ASCII
decimal digits. Digits are consumed greedily, but only while the number they
spell is still a valid group index. Given a pattern with 3 groups, `$12` is
group `1` followed by a literal `2`, while given a pattern with 12 groups it
is group `12`. A group that did not participate in the match expands to
nothing.

Named references are not supported. A `$` that is not followed by a digit is
an error, as is a trailing `\` with nothing left to escape.

Templates are not precompiled. Errors are detected while expanding.
*/

use memchr::memchr2;

use crate::error::Error;

/// Expand `template` into `dst`.
///
/// `append_group` is called with a group index in `0..=group_count` and must
/// append that group's text (if any) to the given buffer.
///
/// On error, `dst` may contain a partial expansion. Callers that care should
/// expand into a scratch buffer.
pub(crate) fn string<F>(
    template: &str,
    group_count: usize,
    mut append_group: F,
    dst: &mut String,
) -> Result<(), Error>
where
    F: FnMut(usize, &mut String) -> Result<(), Error>,
{
    let bytes = template.as_bytes();
    let mut at = 0;
    while let Some(i) = memchr2(b'\\', b'$', &bytes[at..]) {
        let special = at + i;
        dst.push_str(&template[at..special]);
        if bytes[special] == b'\\' {
            let escaped = template[special + 1..].chars().next().ok_or_else(
                || Error::template("character to be escaped is missing", special),
            )?;
            dst.push(escaped);
            at = special + 1 + escaped.len_utf8();
            continue;
        }
        let (group, end) = parse_group(bytes, special, group_count)?;
        append_group(group, dst)?;
        at = end;
    }
    dst.push_str(&template[at..]);
    Ok(())
}

/// Parse a `$n` group reference where `bytes[dollar] == b'$'`. On success,
/// this returns the group index and the offset just past the reference.
fn parse_group(
    bytes: &[u8],
    dollar: usize,
    group_count: usize,
) -> Result<(usize, usize), Error> {
    let first = match bytes.get(dollar + 1) {
        Some(&b) if b.is_ascii_digit() => usize::from(b - b'0'),
        _ => return Err(Error::template("illegal group reference", dollar)),
    };
    if first > group_count {
        return Err(Error::index("append_replacement", first, group_count));
    }
    let mut group = first;
    let mut end = dollar + 2;
    while let Some(&b) = bytes.get(end) {
        if !b.is_ascii_digit() {
            break;
        }
        let longer = group
            .checked_mul(10)
            .and_then(|g| g.checked_add(usize::from(b - b'0')));
        match longer {
            Some(longer) if longer <= group_count => {
                group = longer;
                end += 1;
            }
            _ => break,
        }
    }
    Ok((group, end))
}

/// Returns a template that expands to `text` literally.
///
/// Every `\` and `$` in `text` is escaped with a `\`.
pub fn quote_replacement(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut quoted = String::with_capacity(text.len());
    let mut at = 0;
    while let Some(i) = memchr2(b'\\', b'$', &bytes[at..]) {
        quoted.push_str(&text[at..at + i]);
        quoted.push('\\');
        quoted.push(char::from(bytes[at + i]));
        at += i + 1;
    }
    quoted.push_str(&text[at..]);
    quoted
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;

    use super::*;

    /// Expands the template where group `i` is the text `<i>`, except for
    /// groups listed in `absent`, which did not participate.
    fn expand(
        template: &str,
        group_count: usize,
        absent: &[usize],
    ) -> Result<String, Error> {
        let mut dst = String::new();
        string(
            template,
            group_count,
            |i, dst| {
                if !absent.contains(&i) {
                    dst.push_str(&format!("<{}>", i));
                }
                Ok(())
            },
            &mut dst,
        )?;
        Ok(dst)
    }

    fn template_offset(err: &Error) -> Option<usize> {
        match *err.kind() {
            ErrorKind::Template { offset, .. } => Some(offset),
            _ => None,
        }
    }

    #[test]
    fn literal() {
        assert_eq!("", expand("", 0, &[]).unwrap());
        assert_eq!("plain text", expand("plain text", 3, &[]).unwrap());
        assert_eq!("☃ and β", expand("☃ and β", 0, &[]).unwrap());
    }

    #[test]
    fn simple_groups() {
        assert_eq!("<0>", expand("$0", 0, &[]).unwrap());
        assert_eq!("a<1>b<2>c", expand("a$1b$2c", 2, &[]).unwrap());
        assert_eq!("<2><1>", expand("$2$1", 2, &[]).unwrap());
    }

    #[test]
    fn greedy_digits_stop_at_group_count() {
        assert_eq!("<1> <1>2", expand("$1 $12", 3, &[]).unwrap());
        assert_eq!("<1> <12>", expand("$1 $12", 12, &[]).unwrap());
        assert_eq!("<11>1", expand("$111", 12, &[]).unwrap());
        assert_eq!("<1>0", expand("$10", 9, &[]).unwrap());
    }

    #[test]
    fn huge_reference_does_not_overflow() {
        let template = format!("$1{}", "9".repeat(40));
        let want = format!("<1>{}", "9".repeat(40));
        assert_eq!(want, expand(&template, 5, &[]).unwrap());
    }

    #[test]
    fn absent_group_expands_to_nothing() {
        assert_eq!("[]", expand("[$1]", 1, &[1]).unwrap());
    }

    #[test]
    fn escapes() {
        assert_eq!(r"\", expand(r"\\", 0, &[]).unwrap());
        assert_eq!("$1", expand(r"\$1", 1, &[]).unwrap());
        assert_eq!("a", expand(r"\a", 0, &[]).unwrap());
        assert_eq!("β", expand(r"\β", 0, &[]).unwrap());
        assert_eq!(r"\<0>", expand(r"\\$0", 0, &[]).unwrap());
    }

    #[test]
    fn dangling_backslash() {
        let err = expand(r"abc\", 0, &[]).unwrap_err();
        assert_eq!(Some(3), template_offset(&err));
    }

    #[test]
    fn dollar_without_digit() {
        let err = expand("a$", 1, &[]).unwrap_err();
        assert_eq!(Some(1), template_offset(&err));
        let err = expand("${name}", 1, &[]).unwrap_err();
        assert_eq!(Some(0), template_offset(&err));
        let err = expand("$x", 1, &[]).unwrap_err();
        assert_eq!(Some(0), template_offset(&err));
    }

    #[test]
    fn first_digit_out_of_range() {
        let err = expand("$2", 1, &[]).unwrap_err();
        assert!(matches!(
            *err.kind(),
            ErrorKind::Index { index: 2, group_count: 1 }
        ));
    }

    #[test]
    fn quoting() {
        assert_eq!("abc", quote_replacement("abc"));
        assert_eq!(r"\$1 costs \\ \$", quote_replacement(r"$1 costs \ $"));
        let quoted = quote_replacement(r"$0\$9");
        assert_eq!(r"$0\$9", expand(&quoted, 0, &[]).unwrap());
    }
}
