use std::ops::{Index, IndexMut};

/// Data channel addresses are 15 bits wide.
pub const ADDRESS_MASK: u16 = 0o77777;

/// Words in a standard Micronova memory.
pub const DEFAULT_MEMORY_WORDS: usize = 0o100000;

/// Number of data channel maps the controllers may select.
pub const NUM_MAPS: usize = 4;

/// Memory as seen through the data channel. Controllers transfer one word
/// at a time, passing every address through `map_address`; a word whose
/// address does not map onto memory is dropped.
pub trait DmaMemory {
    /// Translate a data channel address through the given map. Returns
    /// `None` if the result lies outside memory.
    fn map_address(&self, map: u8, address: u16) -> Option<usize>;
    fn load_word(&self, physical: usize) -> u16;
    fn store_word(&mut self, physical: usize, value: u16);
}

/// Read the word at a data channel address; unmapped addresses read zero.
pub fn dma_load(memory: &dyn DmaMemory, map: u8, address: u16) -> u16 {
    memory.map_address(map, address & ADDRESS_MASK)
        .map_or(0, |pa| memory.load_word(pa))
}

/// Write the word at a data channel address; unmapped addresses are
/// silently dropped.
pub fn dma_store(memory: &mut dyn DmaMemory, map: u8, address: u16, value: u16) {
    if let Some(pa) = memory.map_address(map, address & ADDRESS_MASK) {
        memory.store_word(pa, value);
    }
}

/// Flat word memory with a bank base per data channel map.
pub struct Memory {
    words: Vec<u16>,
    bank_base: [usize; NUM_MAPS],
}

impl Memory {
    /// A standard 32K word memory with identity maps.
    pub fn new() -> Self {
        Self::with_size(DEFAULT_MEMORY_WORDS)
    }

    /// A memory of the given number of words. Sizes below 32K model a
    /// machine with memory missing from the top of the address space.
    pub fn with_size(words: usize) -> Self {
        Memory {
            words: vec![0; words],
            bank_base: [0; NUM_MAPS],
        }
    }

    /// Point a data channel map at a different physical bank.
    pub fn set_bank_base(&mut self, map: u8, base: usize) {
        self.bank_base[map as usize % NUM_MAPS] = base;
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl DmaMemory for Memory {
    fn map_address(&self, map: u8, address: u16) -> Option<usize> {
        let physical = self.bank_base[map as usize % NUM_MAPS] + address as usize;
        if physical < self.words.len() {Some(physical)} else {None}
    }

    fn load_word(&self, physical: usize) -> u16 {
        self.words[physical]
    }

    fn store_word(&mut self, physical: usize, value: u16) {
        self.words[physical] = value;
    }
}

impl Index<usize> for Memory {
    type Output = u16;

    fn index(&self, index: usize) -> &Self::Output {
        self.words.index(index)
    }
}

impl IndexMut<usize> for Memory {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        self.words.index_mut(index)
    }
}
