//! Compiler flag extraction.

/// Include-path values from `-I<p>`, `-I <p>`, `-isystem<p>`, `-isystem <p>`
/// and `-iquote` in either form.
pub fn include_values(args: &[String]) -> Vec<String> {
    let mut values = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let Some(prefix) = ["-isystem", "-iquote", "-I"]
            .into_iter()
            .find(|p| arg.starts_with(p))
        else {
            continue;
        };
        let attached = &arg[prefix.len()..];
        if attached.is_empty() {
            if let Some(next) = iter.next() {
                values.push(next.clone());
            }
        } else {
            values.push(attached.to_string());
        }
    }
    values
}

/// Macro definitions (`-DNAME`, `-DNAME=value`, `-D NAME`).
pub fn macros(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(rest) = arg.strip_prefix("-D") {
            if rest.is_empty() {
                if let Some(next) = iter.next() {
                    out.push(next.clone());
                }
            } else {
                out.push(rest.to_string());
            }
        }
    }
    out
}

/// Language standard from the last `-std=` flag.
pub fn language_standard(args: &[String]) -> Option<String> {
    args.iter()
        .rev()
        .find_map(|arg| arg.strip_prefix("-std="))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn include_values_handles_both_forms() {
        let values = include_values(&args(
            "gcc -Iinc -I /abs/inc -isystem /usr/x -isystem/opt/y -iquote q -o out.o",
        ));
        assert_eq!(values, vec!["inc", "/abs/inc", "/usr/x", "/opt/y", "q"]);
    }

    #[test]
    fn trailing_flag_without_value_is_ignored() {
        assert!(include_values(&args("gcc -I")).is_empty());
    }

    #[test]
    fn macros_and_standard() {
        let a = args("g++ -DDEBUG -D LEVEL=2 -std=c++11 -std=c++17 -c x.cc");
        assert_eq!(macros(&a), vec!["DEBUG", "LEVEL=2"]);
        assert_eq!(language_standard(&a).as_deref(), Some("c++17"));
        assert_eq!(language_standard(&args("gcc x.c")), None);
    }
}
