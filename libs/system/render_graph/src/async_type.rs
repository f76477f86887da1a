use bitflags::bitflags;

bitflags! {
    /// Wait is set iff any predecessor is on a different queue; Signal is
    /// set iff any successor is on a different queue (Section 4.4 compile
    /// phase).
    #[derive(Default)]
    pub struct AsyncType: u8 {
        const WAIT = 0b01;
        const SIGNAL = 0b10;
    }
}
