use std::fmt::Write;

const WORDS_PER_LINE: usize = 8;

/// Nicely format the given words as an octal dump, eight words per line.
/// The listed addresses will start from `start`. Each line ends with the
/// words' ASCII rendering, high byte first as the Nova packs characters.
pub fn pretty_print_octal_words(words: &[u16], start: usize) -> String {
    // Each line is a 6-digit address, four spaces, eight 6-digit words
    // with separators, two spaces and 18 characters of ASCII.
    let mut str = String::with_capacity((words.len() / WORDS_PER_LINE + 1) * 90);
    for (line_num, line) in words.chunks(WORDS_PER_LINE).enumerate() {
        if line_num != 0 {
            str.push('\n');
        }
        let address = start + line_num * WORDS_PER_LINE;
        // Writing to a String cannot fail.
        let _ = write!(str, "{:06o}    ", address);
        for (i, word) in line.iter().enumerate() {
            match i {
                0 => {}
                4 => str.push_str("  "),
                _ => str.push(' '),
            }
            let _ = write!(str, "{:06o}", word);
        }
        // Pad a short final line so the ASCII column lines up.
        for i in line.len()..WORDS_PER_LINE {
            str.push_str(if i == 4 { "        " } else { "       " });
        }
        str.push_str("  |");
        for word in line {
            let [hi, lo] = word.to_be_bytes();
            str.push(printable(hi));
            str.push(printable(lo));
        }
        str.push('|');
    }
    str
}

fn printable(chr: u8) -> char {
    match chr {
        32..=126 => chr.into(),
        _ => '.',
    }
}
