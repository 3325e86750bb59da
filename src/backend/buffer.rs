// GPU buffers for vertex, index, uniform and staging data
//
// A Buffer is one allocation holding `instance_count` records of
// `instance_size` bytes, each padded to the minimum offset alignment so
// that per-record offsets can be bound directly as dynamic/UBO offsets.
//
// Host access goes through an explicit mapping. The mapping is owned by
// the Buffer and released before the memory is freed.

use anyhow::{Context, Result};
use ash::vk;
use std::ffi::c_void;
use std::ptr::NonNull;

use super::VulkanDevice;

/// Size bookkeeping for an array of alignment-padded records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    pub instance_size: vk::DeviceSize,
    pub instance_count: u32,
    pub alignment_size: vk::DeviceSize,
    pub buffer_size: vk::DeviceSize,
}

impl BufferLayout {
    pub fn new(
        instance_size: vk::DeviceSize,
        instance_count: u32,
        min_offset_alignment: vk::DeviceSize,
    ) -> Self {
        let alignment_size = Self::alignment(instance_size, min_offset_alignment);
        Self {
            instance_size,
            instance_count,
            alignment_size,
            buffer_size: alignment_size * instance_count as vk::DeviceSize,
        }
    }

    /// Round `instance_size` up to a multiple of `min_offset_alignment`.
    /// Alignments of 0 or 1 leave the size unchanged.
    pub fn alignment(
        instance_size: vk::DeviceSize,
        min_offset_alignment: vk::DeviceSize,
    ) -> vk::DeviceSize {
        if min_offset_alignment > 0 {
            debug_assert!(
                min_offset_alignment.is_power_of_two(),
                "offset alignment {min_offset_alignment} is not a power of two"
            );
            (instance_size + min_offset_alignment - 1) & !(min_offset_alignment - 1)
        } else {
            instance_size
        }
    }

    /// Byte offset of record `index`. Strides by the padded size.
    pub fn index_offset(&self, index: u32) -> vk::DeviceSize {
        debug_assert!(
            index < self.instance_count,
            "index {index} out of range for {} instances",
            self.instance_count
        );
        index as vk::DeviceSize * self.alignment_size
    }
}

/// A host-visible window onto mapped device memory.
///
/// Every access is bounds-checked against the mapped length.
#[derive(Debug)]
pub struct HostMapping {
    ptr: NonNull<u8>,
    len: usize,
}

impl HostMapping {
    /// Wrap a pointer returned by `vkMapMemory`. Returns `None` for null.
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes of `len` bytes for as long
    /// as the returned value lives.
    pub unsafe fn from_raw(ptr: *mut c_void, len: usize) -> Option<Self> {
        NonNull::new(ptr.cast::<u8>()).map(|ptr| Self { ptr, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn write(&mut self, offset: usize, data: &[u8]) {
        self.check_range(offset, data.len());
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.as_ptr().add(offset), data.len());
        }
    }

    pub fn read(&self, offset: usize, len: usize) -> &[u8] {
        self.check_range(offset, len);
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(offset), len) }
    }

    /// Copy `size` bytes of `data` to `offset`. `vk::WHOLE_SIZE` copies all
    /// of `data` to the start of the mapping, ignoring `offset`.
    pub fn write_range(&mut self, data: &[u8], size: vk::DeviceSize, offset: vk::DeviceSize) {
        if size == vk::WHOLE_SIZE {
            self.write(0, data);
            return;
        }

        let size = size as usize;
        assert!(
            size <= data.len(),
            "write of {size} bytes from a {} byte slice",
            data.len()
        );
        self.write(offset as usize, &data[..size]);
    }

    fn check_range(&self, offset: usize, len: usize) {
        let in_bounds = offset.checked_add(len).is_some_and(|end| end <= self.len);
        assert!(
            in_bounds,
            "range {offset}..+{len} exceeds mapped region of {} bytes",
            self.len
        );
    }
}

/// Host mapping of a memory object.
///
/// # Safety
/// A pointer returned by `map_memory` must stay valid for reads and writes
/// of the requested range until the matching `unmap_memory`.
pub unsafe trait MapMemory {
    fn map_memory(&mut self, offset: vk::DeviceSize, size: vk::DeviceSize) -> Result<*mut c_void>;
    fn unmap_memory(&mut self);
}

/// `vkMapMemory` / `vkUnmapMemory` on one allocation
struct DeviceMemoryMap<'a> {
    device: &'a ash::Device,
    memory: vk::DeviceMemory,
}

unsafe impl MapMemory for DeviceMemoryMap<'_> {
    fn map_memory(&mut self, offset: vk::DeviceSize, size: vk::DeviceSize) -> Result<*mut c_void> {
        unsafe {
            self.device
                .map_memory(self.memory, offset, size, vk::MemoryMapFlags::empty())
        }
        .context("Failed to map buffer memory")
    }

    fn unmap_memory(&mut self) {
        unsafe { self.device.unmap_memory(self.memory) };
    }
}

/// Whether a buffer is mapped, and where.
///
/// Writes and reads require an active mapping. Unmapping twice is a no-op.
#[derive(Debug, Default)]
pub struct MappingState {
    mapping: Option<HostMapping>,
}

impl MappingState {
    /// Map `size` bytes at `offset` of a `buffer_size` byte buffer,
    /// releasing any previous mapping first
    pub fn map(
        &mut self,
        memory: &mut impl MapMemory,
        buffer_size: vk::DeviceSize,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> Result<()> {
        self.unmap(memory);

        let len = if size == vk::WHOLE_SIZE {
            buffer_size.saturating_sub(offset)
        } else {
            size
        };
        assert!(
            offset + len <= buffer_size,
            "mapping {offset}..+{len} exceeds buffer of {buffer_size} bytes"
        );

        let ptr = memory.map_memory(offset, size)?;
        let mapping = match unsafe { HostMapping::from_raw(ptr, len as usize) } {
            Some(mapping) => mapping,
            None => {
                memory.unmap_memory();
                anyhow::bail!("vkMapMemory returned a null pointer");
            }
        };
        self.mapping = Some(mapping);
        Ok(())
    }

    pub fn unmap(&mut self, memory: &mut impl MapMemory) {
        if self.mapping.take().is_some() {
            memory.unmap_memory();
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    pub fn write(&mut self, data: &[u8], size: vk::DeviceSize, offset: vk::DeviceSize) {
        let Some(mapping) = self.mapping.as_mut() else {
            panic!("Cannot write to an unmapped buffer");
        };
        mapping.write_range(data, size, offset);
    }

    pub fn read(&self, offset: usize, len: usize) -> &[u8] {
        let Some(mapping) = self.mapping.as_ref() else {
            panic!("Cannot read from an unmapped buffer");
        };
        mapping.read(offset, len)
    }
}

/// Grow a flush/invalidate range to `atom` boundaries (nonCoherentAtomSize).
/// A range that reaches the end of the buffer becomes WHOLE_SIZE, since the
/// allocation may be larger than the buffer.
pub fn atom_aligned_range(
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    atom: vk::DeviceSize,
    buffer_size: vk::DeviceSize,
) -> (vk::DeviceSize, vk::DeviceSize) {
    let atom = atom.max(1);
    let start = offset / atom * atom;
    if size == vk::WHOLE_SIZE {
        return (start, vk::WHOLE_SIZE);
    }

    let end = (offset + size).div_ceil(atom) * atom;
    if end >= buffer_size {
        (start, vk::WHOLE_SIZE)
    } else {
        (start, end - start)
    }
}

/// Vulkan buffer plus its dedicated memory allocation
pub struct Buffer<'d> {
    device: &'d VulkanDevice,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    layout: BufferLayout,
    usage: vk::BufferUsageFlags,
    memory_properties: vk::MemoryPropertyFlags,
    mapping: MappingState,
}

impl<'d> Buffer<'d> {
    pub fn new(
        device: &'d VulkanDevice,
        instance_size: vk::DeviceSize,
        instance_count: u32,
        usage: vk::BufferUsageFlags,
        memory_properties: vk::MemoryPropertyFlags,
        min_offset_alignment: vk::DeviceSize,
    ) -> Result<Self> {
        let layout = BufferLayout::new(instance_size, instance_count, min_offset_alignment);
        let (buffer, memory) = device.create_buffer(layout.buffer_size, usage, memory_properties)?;

        Ok(Self {
            device,
            buffer,
            memory,
            layout,
            usage,
            memory_properties,
            mapping: MappingState::default(),
        })
    }

    /// Upload `data` into a new device-local buffer through a temporary
    /// host-visible staging buffer. Blocks until the copy has executed.
    pub fn staged(
        device: &'d VulkanDevice,
        instance_size: vk::DeviceSize,
        instance_count: u32,
        usage: vk::BufferUsageFlags,
        data: &[u8],
    ) -> Result<Self> {
        let mut staging = Buffer::new(
            device,
            instance_size,
            instance_count,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            1,
        )?;
        staging.map_all()?;
        staging.write_to_buffer(data, vk::WHOLE_SIZE, 0);
        staging.unmap();

        let target = Buffer::new(
            device,
            instance_size,
            instance_count,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            1,
        )?;
        device
            .copy_buffer(staging.handle(), target.handle(), target.layout.buffer_size)
            .context("Failed to copy staging buffer")?;

        Ok(target)
    }

    /// Map `size` bytes starting at `offset`. An existing mapping is
    /// released first.
    pub fn map(&mut self, size: vk::DeviceSize, offset: vk::DeviceSize) -> Result<()> {
        let mut memory = DeviceMemoryMap {
            device: &self.device.device,
            memory: self.memory,
        };
        self.mapping
            .map(&mut memory, self.layout.buffer_size, size, offset)
    }

    pub fn map_all(&mut self) -> Result<()> {
        self.map(vk::WHOLE_SIZE, 0)
    }

    /// Release the mapping. Does nothing when not mapped.
    pub fn unmap(&mut self) {
        let mut memory = DeviceMemoryMap {
            device: &self.device.device,
            memory: self.memory,
        };
        self.mapping.unmap(&mut memory);
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.is_mapped()
    }

    /// Copy into the mapped region. Offsets are relative to the start of
    /// the mapping.
    ///
    /// Panics when the buffer is not mapped.
    pub fn write_to_buffer(&mut self, data: &[u8], size: vk::DeviceSize, offset: vk::DeviceSize) {
        self.mapping.write(data, size, offset);
    }

    /// Write one record at `index * alignment_size`. Requires a mapping
    /// that starts at offset 0.
    pub fn write_to_index(&mut self, data: &[u8], index: u32) {
        debug_assert_eq!(
            data.len() as vk::DeviceSize,
            self.layout.instance_size,
            "record size mismatch"
        );
        let offset = self.layout.index_offset(index);
        self.write_to_buffer(data, data.len() as vk::DeviceSize, offset);
    }

    /// Read back one record. Call `invalidate_index` first for memory
    /// without HOST_COHERENT.
    pub fn read_index(&self, index: u32) -> &[u8] {
        self.mapping.read(
            self.layout.index_offset(index) as usize,
            self.layout.instance_size as usize,
        )
    }

    /// Make host writes in the range visible to the device.
    /// Only needed for memory without HOST_COHERENT.
    pub fn flush(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> Result<()> {
        let range = self.mapped_range(size, offset);
        unsafe { self.device.device.flush_mapped_memory_ranges(&[range]) }
            .context("Failed to flush mapped memory")
    }

    /// Make device writes in the range visible to the host.
    /// Only needed for memory without HOST_COHERENT.
    pub fn invalidate(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> Result<()> {
        let range = self.mapped_range(size, offset);
        unsafe { self.device.device.invalidate_mapped_memory_ranges(&[range]) }
            .context("Failed to invalidate mapped memory")
    }

    pub fn flush_index(&self, index: u32) -> Result<()> {
        self.flush(self.layout.alignment_size, self.layout.index_offset(index))
    }

    pub fn invalidate_index(&self, index: u32) -> Result<()> {
        self.invalidate(self.layout.alignment_size, self.layout.index_offset(index))
    }

    fn mapped_range(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> vk::MappedMemoryRange {
        let (offset, size) = atom_aligned_range(
            offset,
            size,
            self.device.properties.limits.non_coherent_atom_size,
            self.layout.buffer_size,
        );
        vk::MappedMemoryRange::builder()
            .memory(self.memory)
            .offset(offset)
            .size(size)
            .build()
    }

    pub fn descriptor_info(
        &self,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset,
            range: size,
        }
    }

    pub fn descriptor_info_for_index(&self, index: u32) -> vk::DescriptorBufferInfo {
        self.descriptor_info(self.layout.alignment_size, self.layout.index_offset(index))
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    pub fn instance_count(&self) -> u32 {
        self.layout.instance_count
    }

    pub fn buffer_size(&self) -> vk::DeviceSize {
        self.layout.buffer_size
    }

    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    pub fn memory_properties(&self) -> vk::MemoryPropertyFlags {
        self.memory_properties
    }
}

impl Drop for Buffer<'_> {
    fn drop(&mut self) {
        self.unmap();
        unsafe {
            self.device.device.destroy_buffer(self.buffer, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping_over(backing: &mut [u8]) -> HostMapping {
        unsafe { HostMapping::from_raw(backing.as_mut_ptr().cast(), backing.len()) }.unwrap()
    }

    #[test]
    fn alignment_rounds_up_to_power_of_two() {
        let cases = [
            (1, 0, 1),
            (16, 0, 16),
            (16, 1, 16),
            (16, 64, 64),
            (64, 64, 64),
            (65, 64, 128),
            (12, 4, 12),
            (13, 4, 16),
            (100, 256, 256),
        ];

        for (instance_size, alignment, expected) in cases {
            let aligned = BufferLayout::alignment(instance_size, alignment);
            assert_eq!(aligned, expected, "size {instance_size} align {alignment}");
            assert!(aligned >= instance_size);
        }
    }

    #[test]
    fn buffer_size_is_padded_stride_times_count() {
        for count in 1..6 {
            let layout = BufferLayout::new(24, count, 32);
            assert_eq!(layout.alignment_size, 32);
            assert_eq!(layout.buffer_size, 32 * count as vk::DeviceSize);
        }
    }

    #[test]
    fn index_offsets_use_aligned_stride() {
        let layout = BufferLayout::new(16, 4, 64);

        let offsets: Vec<_> = (0..4).map(|i| layout.index_offset(i)).collect();
        assert_eq!(offsets, vec![0, 64, 128, 192]);
    }

    #[test]
    fn indexed_writes_do_not_bleed() {
        let layout = BufferLayout::new(16, 4, 64);
        let mut backing = vec![0u8; layout.buffer_size as usize];
        let mut mapping = mapping_over(&mut backing);

        for index in 0..4 {
            let pattern = [0xA0 | index as u8; 16];
            mapping.write_range(&pattern, 16, layout.index_offset(index));
        }

        for index in 0..4 {
            let offset = layout.index_offset(index) as usize;
            assert_eq!(mapping.read(offset, 16), &[0xA0 | index as u8; 16]);
            // Padding between records stays untouched
            assert!(mapping.read(offset + 16, 48).iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn whole_size_write_copies_data_from_start() {
        let mut backing = vec![0u8; 8];
        let mut mapping = mapping_over(&mut backing);

        mapping.write_range(&[1, 2, 3], vk::WHOLE_SIZE, 5);

        assert_eq!(mapping.read(0, 8), &[1, 2, 3, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn partial_write_copies_only_size_bytes() {
        let mut backing = vec![0u8; 8];
        let mut mapping = mapping_over(&mut backing);

        mapping.write_range(&[9, 9, 9, 9], 2, 4);

        assert_eq!(mapping.read(0, 8), &[0, 0, 0, 0, 9, 9, 0, 0]);
    }

    #[test]
    #[should_panic(expected = "exceeds mapped region")]
    fn out_of_bounds_write_panics() {
        let mut backing = vec![0u8; 8];
        let mut mapping = mapping_over(&mut backing);

        mapping.write(6, &[1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "exceeds mapped region")]
    fn overflowing_offset_panics() {
        let mut backing = vec![0u8; 8];
        let mapping = mapping_over(&mut backing);

        mapping.read(usize::MAX, 2);
    }

    /// Host memory standing in for a device allocation
    struct HostMemory {
        backing: Vec<u8>,
        maps: usize,
        unmaps: usize,
    }

    impl HostMemory {
        fn new(len: usize) -> Self {
            Self {
                backing: vec![0; len],
                maps: 0,
                unmaps: 0,
            }
        }
    }

    unsafe impl MapMemory for HostMemory {
        fn map_memory(&mut self, offset: vk::DeviceSize, _size: vk::DeviceSize) -> Result<*mut c_void> {
            self.maps += 1;
            Ok(unsafe { self.backing.as_mut_ptr().add(offset as usize) }.cast())
        }

        fn unmap_memory(&mut self) {
            self.unmaps += 1;
        }
    }

    #[test]
    fn remap_after_unmap_keeps_writing() {
        let mut memory = HostMemory::new(8);
        let mut state = MappingState::default();

        state.map(&mut memory, 8, vk::WHOLE_SIZE, 0).unwrap();
        state.write(&[1, 2, 3, 4], 4, 0);
        state.unmap(&mut memory);
        state.unmap(&mut memory);

        assert!(!state.is_mapped());
        assert_eq!(memory.unmaps, 1);

        state.map(&mut memory, 8, vk::WHOLE_SIZE, 0).unwrap();
        state.write(&[9], 1, 2);

        assert_eq!(state.read(0, 4), &[1, 2, 9, 4]);
        assert_eq!(memory.maps, 2);
        state.unmap(&mut memory);
        assert_eq!(memory.unmaps, 2);
    }

    #[test]
    fn mapping_again_releases_previous_mapping() {
        let mut memory = HostMemory::new(16);
        let mut state = MappingState::default();

        state.map(&mut memory, 16, 8, 0).unwrap();
        state.map(&mut memory, 16, vk::WHOLE_SIZE, 8).unwrap();
        state.write(&[7; 8], 8, 0);

        assert_eq!((memory.maps, memory.unmaps), (2, 1));
        assert_eq!(&memory.backing[8..], &[7; 8]);
    }

    #[test]
    #[should_panic(expected = "unmapped buffer")]
    fn write_without_mapping_panics() {
        let mut state = MappingState::default();
        state.write(&[1, 2], 2, 0);
    }

    #[test]
    #[should_panic(expected = "unmapped buffer")]
    fn write_after_unmap_panics() {
        let mut memory = HostMemory::new(4);
        let mut state = MappingState::default();

        state.map(&mut memory, 4, vk::WHOLE_SIZE, 0).unwrap();
        state.unmap(&mut memory);
        state.write(&[1], 1, 0);
    }

    #[test]
    #[should_panic(expected = "exceeds buffer")]
    fn mapping_past_the_end_panics() {
        let mut memory = HostMemory::new(16);
        let mut state = MappingState::default();

        let _ = state.map(&mut memory, 16, 12, 8);
    }

    #[test]
    fn flush_ranges_grow_to_atom_boundaries() {
        let cases = [
            // (offset, size, atom, buffer_size) -> (offset, size)
            ((0, 16, 1, 256), (0, 16)),
            ((64, 16, 64, 256), (64, 64)),
            ((100, 10, 64, 1024), (64, 64)),
            ((10, 20, 0, 256), (10, 20)),
            ((192, 16, 64, 256), (192, vk::WHOLE_SIZE)),
            ((0, 48, 64, 48), (0, vk::WHOLE_SIZE)),
            ((70, vk::WHOLE_SIZE, 64, 256), (64, vk::WHOLE_SIZE)),
        ];

        for ((offset, size, atom, buffer_size), expected) in cases {
            assert_eq!(
                atom_aligned_range(offset, size, atom, buffer_size),
                expected,
                "offset {offset} size {size} atom {atom}"
            );
        }
    }

    #[test]
    fn null_pointer_is_not_a_mapping() {
        assert!(unsafe { HostMapping::from_raw(std::ptr::null_mut(), 16) }.is_none());
    }
}
