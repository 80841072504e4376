//! Fixed-offset field codec.
//!
//! Messages are laid out packed, in native byte order. Callers validate
//! the buffer length against the message's wire size before constructing
//! a `Reader` or `Writer`, so field accesses never run past the end.

/// Copy `s` into a fixed-capacity NUL-terminated field.
///
/// Text longer than `dst.len() - 1` bytes is truncated at a UTF-8 char
/// boundary. The remainder of the field is zero-filled.
pub fn write_cstr(dst: &mut [u8], s: &str) {
    dst.fill(0);
    if dst.is_empty() {
        return;
    }
    let mut n = s.len().min(dst.len() - 1);
    while !s.is_char_boundary(n) {
        n -= 1;
    }
    dst[..n].copy_from_slice(&s.as_bytes()[..n]);
}

/// Read a NUL-terminated field. A field with no NUL uses its full width.
pub fn read_cstr(src: &[u8]) -> String {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).into_owned()
}

pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn at(buf: &'a mut [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    #[inline]
    pub fn u32(&mut self, v: u32) {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&v.to_ne_bytes());
        self.pos += 4;
    }

    #[inline]
    pub fn i32(&mut self, v: i32) {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&v.to_ne_bytes());
        self.pos += 4;
    }

    #[inline]
    pub fn str(&mut self, s: &str, cap: usize) {
        write_cstr(&mut self.buf[self.pos..self.pos + cap], s);
        self.pos += cap;
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}

pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    #[inline]
    pub fn u32(&mut self) -> u32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        u32::from_ne_bytes(b)
    }

    #[inline]
    pub fn i32(&mut self) -> i32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        i32::from_ne_bytes(b)
    }

    #[inline]
    pub fn str(&mut self, cap: usize) -> String {
        let s = read_cstr(&self.buf[self.pos..self.pos + cap]);
        self.pos += cap;
        s
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}
