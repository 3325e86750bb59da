// Descriptor set layouts, pools and writers
//
// Layouts are built once and never change. Pools hand out sets until
// their budget runs out; exhaustion is reported as `Ok(None)` so callers
// can fall back (e.g. create another pool) instead of failing the frame.
// Writers collect buffer/image bindings and apply them in one update.

use anyhow::{Context, Result};
use ash::vk;
use std::collections::{BTreeMap, HashMap};

use super::VulkanDevice;

const DEFAULT_MAX_SETS: u32 = 1000;

/// One slot of a set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingDesc {
    pub descriptor_type: vk::DescriptorType,
    pub stage_flags: vk::ShaderStageFlags,
    pub count: u32,
}

/// Binding slot -> description, unique per slot
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    bindings: BTreeMap<u32, BindingDesc>,
}

impl BindingTable {
    pub fn insert(&mut self, binding: u32, desc: BindingDesc) {
        debug_assert!(
            !self.bindings.contains_key(&binding),
            "Binding {binding} already in use"
        );
        self.bindings.insert(binding, desc);
    }

    pub fn get(&self, binding: u32) -> Option<&BindingDesc> {
        self.bindings.get(&binding)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Descriptor type of a slot that takes exactly one descriptor.
    ///
    /// Writing an undeclared slot or an array slot with a single info is a
    /// caller bug: asserted in debug builds, `None` otherwise.
    pub fn single_descriptor_type(&self, binding: u32) -> Option<vk::DescriptorType> {
        let desc = self.bindings.get(&binding);
        debug_assert!(desc.is_some(), "Layout does not contain binding {binding}");

        let desc = desc?;
        debug_assert!(
            desc.count == 1,
            "Binding {binding} expects {} descriptors but a single info was written",
            desc.count
        );
        (desc.count == 1).then_some(desc.descriptor_type)
    }

    /// Descriptors consumed from a pool by one set with this layout
    pub fn set_cost(&self) -> SetCost {
        let mut per_type = HashMap::new();
        for desc in self.bindings.values() {
            *per_type.entry(desc.descriptor_type).or_insert(0) += desc.count;
        }
        SetCost { per_type }
    }

    pub fn to_vk(&self) -> Vec<vk::DescriptorSetLayoutBinding> {
        self.bindings
            .iter()
            .map(|(&binding, desc)| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding)
                    .descriptor_type(desc.descriptor_type)
                    .descriptor_count(desc.count)
                    .stage_flags(desc.stage_flags)
                    .build()
            })
            .collect()
    }
}

/// Per-type descriptor count of one set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetCost {
    per_type: HashMap<vk::DescriptorType, u32>,
}

/// Host-side mirror of a pool's capacity.
///
/// Checked before calling into the driver so that a full pool reports
/// failure deterministically, whatever the driver would do.
#[derive(Debug, Clone)]
pub struct PoolBudget {
    max_sets: u32,
    capacity: HashMap<vk::DescriptorType, u32>,
    sets_in_use: u32,
    in_use: HashMap<vk::DescriptorType, u32>,
}

impl PoolBudget {
    pub fn new(max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize]) -> Self {
        let mut capacity = HashMap::new();
        for size in pool_sizes {
            *capacity.entry(size.ty).or_insert(0) += size.descriptor_count;
        }
        Self {
            max_sets,
            capacity,
            sets_in_use: 0,
            in_use: HashMap::new(),
        }
    }

    /// Reserve room for one set. Nothing is reserved on failure.
    pub fn try_reserve(&mut self, cost: &SetCost) -> bool {
        if self.sets_in_use >= self.max_sets {
            return false;
        }

        let fits = cost.per_type.iter().all(|(ty, &count)| {
            let used = self.in_use.get(ty).copied().unwrap_or(0);
            let capacity = self.capacity.get(ty).copied().unwrap_or(0);
            used + count <= capacity
        });
        if !fits {
            return false;
        }

        self.sets_in_use += 1;
        for (&ty, &count) in &cost.per_type {
            *self.in_use.entry(ty).or_insert(0) += count;
        }
        true
    }

    pub fn release(&mut self, cost: &SetCost) {
        self.sets_in_use = self.sets_in_use.saturating_sub(1);
        for (ty, &count) in &cost.per_type {
            if let Some(used) = self.in_use.get_mut(ty) {
                *used = used.saturating_sub(count);
            }
        }
    }

    pub fn reset(&mut self) {
        self.sets_in_use = 0;
        self.in_use.clear();
    }

    pub fn sets_in_use(&self) -> u32 {
        self.sets_in_use
    }
}

enum PendingInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

struct PendingWrite {
    binding: u32,
    descriptor_type: vk::DescriptorType,
    info: PendingInfo,
}

/// Bindings waiting to be written into a set
#[derive(Default)]
pub struct WriteBatch {
    writes: Vec<PendingWrite>,
}

impl WriteBatch {
    pub fn push_buffer(
        &mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        info: vk::DescriptorBufferInfo,
    ) {
        self.writes.push(PendingWrite {
            binding,
            descriptor_type,
            info: PendingInfo::Buffer(info),
        });
    }

    pub fn push_image(
        &mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        info: vk::DescriptorImageInfo,
    ) {
        self.writes.push(PendingWrite {
            binding,
            descriptor_type,
            info: PendingInfo::Image(info),
        });
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Vulkan write records targeting `set`. They point into this batch and
    /// must be consumed while it is borrowed.
    pub fn to_vk(&self, set: vk::DescriptorSet) -> Vec<vk::WriteDescriptorSet> {
        self.writes
            .iter()
            .map(|write| {
                let builder = vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(write.binding)
                    .dst_array_element(0)
                    .descriptor_type(write.descriptor_type);
                match &write.info {
                    PendingInfo::Buffer(info) => builder.buffer_info(std::slice::from_ref(info)).build(),
                    PendingInfo::Image(info) => builder.image_info(std::slice::from_ref(info)).build(),
                }
            })
            .collect()
    }
}

// =============================================================================
// LAYOUT
// =============================================================================

pub struct DescriptorSetLayout<'d> {
    device: &'d VulkanDevice,
    layout: vk::DescriptorSetLayout,
    bindings: BindingTable,
}

pub struct DescriptorSetLayoutBuilder<'d> {
    device: &'d VulkanDevice,
    bindings: BindingTable,
}

impl<'d> DescriptorSetLayoutBuilder<'d> {
    pub fn add_binding(
        self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.add_binding_array(binding, descriptor_type, stage_flags, 1)
    }

    pub fn add_binding_array(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
        count: u32,
    ) -> Self {
        self.bindings.insert(
            binding,
            BindingDesc {
                descriptor_type,
                stage_flags,
                count,
            },
        );
        self
    }

    pub fn build(self) -> Result<DescriptorSetLayout<'d>> {
        let vk_bindings = self.bindings.to_vk();
        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&vk_bindings);

        let layout = unsafe {
            self.device
                .device
                .create_descriptor_set_layout(&create_info, None)
        }
        .context("Failed to create descriptor set layout")?;

        Ok(DescriptorSetLayout {
            device: self.device,
            layout,
            bindings: self.bindings,
        })
    }
}

impl<'d> DescriptorSetLayout<'d> {
    pub fn builder(device: &'d VulkanDevice) -> DescriptorSetLayoutBuilder<'d> {
        DescriptorSetLayoutBuilder {
            device,
            bindings: BindingTable::default(),
        }
    }

    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout<'_> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .device
                .destroy_descriptor_set_layout(self.layout, None)
        };
    }
}

// =============================================================================
// POOL
// =============================================================================

pub struct DescriptorPool<'d> {
    device: &'d VulkanDevice,
    pool: vk::DescriptorPool,
    flags: vk::DescriptorPoolCreateFlags,
    budget: PoolBudget,
    live_sets: HashMap<vk::DescriptorSet, SetCost>,
}

pub struct DescriptorPoolBuilder<'d> {
    device: &'d VulkanDevice,
    pool_sizes: Vec<vk::DescriptorPoolSize>,
    max_sets: u32,
    flags: vk::DescriptorPoolCreateFlags,
}

impl<'d> DescriptorPoolBuilder<'d> {
    /// Room for `count` descriptors of `descriptor_type`
    pub fn add_pool_size(mut self, descriptor_type: vk::DescriptorType, count: u32) -> Self {
        self.pool_sizes.push(vk::DescriptorPoolSize {
            ty: descriptor_type,
            descriptor_count: count,
        });
        self
    }

    pub fn set_pool_flags(mut self, flags: vk::DescriptorPoolCreateFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Upper bound on sets allocated at once
    pub fn set_max_sets(mut self, count: u32) -> Self {
        self.max_sets = count;
        self
    }

    pub fn build(self) -> Result<DescriptorPool<'d>> {
        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&self.pool_sizes)
            .max_sets(self.max_sets)
            .flags(self.flags);

        let pool = unsafe { self.device.device.create_descriptor_pool(&create_info, None) }
            .context("Failed to create descriptor pool")?;

        Ok(DescriptorPool {
            device: self.device,
            pool,
            flags: self.flags,
            budget: PoolBudget::new(self.max_sets, &self.pool_sizes),
            live_sets: HashMap::new(),
        })
    }
}

impl<'d> DescriptorPool<'d> {
    pub fn builder(device: &'d VulkanDevice) -> DescriptorPoolBuilder<'d> {
        DescriptorPoolBuilder {
            device,
            pool_sizes: Vec::new(),
            max_sets: DEFAULT_MAX_SETS,
            flags: vk::DescriptorPoolCreateFlags::empty(),
        }
    }

    /// Allocate one set. `Ok(None)` means the pool is exhausted and nothing
    /// was allocated.
    pub fn allocate_descriptor_set(
        &mut self,
        layout: &DescriptorSetLayout<'_>,
    ) -> Result<Option<vk::DescriptorSet>> {
        let cost = layout.bindings().set_cost();
        if !self.budget.try_reserve(&cost) {
            log::debug!(
                "Descriptor pool exhausted ({} sets in use)",
                self.budget.sets_in_use()
            );
            return Ok(None);
        }

        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        match unsafe { self.device.device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => {
                let set = sets
                    .first()
                    .copied()
                    .context("Driver returned no descriptor set")?;
                self.live_sets.insert(set, cost);
                Ok(Some(set))
            }
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                self.budget.release(&cost);
                log::debug!("Descriptor pool out of memory");
                Ok(None)
            }
            Err(e) => {
                self.budget.release(&cost);
                Err(e).context("Failed to allocate descriptor set")
            }
        }
    }

    /// Return sets to the pool. Requires FREE_DESCRIPTOR_SET.
    pub fn free_descriptors(&mut self, sets: &[vk::DescriptorSet]) -> Result<()> {
        debug_assert!(
            self.flags
                .contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET),
            "Pool was created without FREE_DESCRIPTOR_SET"
        );
        if sets.is_empty() {
            return Ok(());
        }

        for set in sets {
            if let Some(cost) = self.live_sets.remove(set) {
                self.budget.release(&cost);
            }
        }

        unsafe { self.device.device.free_descriptor_sets(self.pool, sets) }
            .context("Failed to free descriptor sets")
    }

    /// Return every set to the pool
    pub fn reset_pool(&mut self) -> Result<()> {
        unsafe {
            self.device
                .device
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())
        }
        .context("Failed to reset descriptor pool")?;

        self.budget.reset();
        self.live_sets.clear();
        Ok(())
    }

    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool<'_> {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_descriptor_pool(self.pool, None) };
    }
}

// =============================================================================
// WRITER
// =============================================================================

pub struct DescriptorWriter<'a, 'd> {
    layout: &'a DescriptorSetLayout<'d>,
    pool: &'a mut DescriptorPool<'d>,
    batch: WriteBatch,
}

impl<'a, 'd> DescriptorWriter<'a, 'd> {
    pub fn new(layout: &'a DescriptorSetLayout<'d>, pool: &'a mut DescriptorPool<'d>) -> Self {
        Self {
            layout,
            pool,
            batch: WriteBatch::default(),
        }
    }

    pub fn write_buffer(mut self, binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        if let Some(ty) = self.layout.bindings().single_descriptor_type(binding) {
            self.batch.push_buffer(binding, ty, info);
        }
        self
    }

    pub fn write_image(mut self, binding: u32, info: vk::DescriptorImageInfo) -> Self {
        if let Some(ty) = self.layout.bindings().single_descriptor_type(binding) {
            self.batch.push_image(binding, ty, info);
        }
        self
    }

    /// Allocate a set and apply every pending write. `Ok(None)` when the
    /// pool is exhausted.
    pub fn build(self) -> Result<Option<vk::DescriptorSet>> {
        let Some(set) = self.pool.allocate_descriptor_set(self.layout)? else {
            return Ok(None);
        };
        self.overwrite(set);
        Ok(Some(set))
    }

    /// Apply pending writes to an existing set
    pub fn overwrite(&self, set: vk::DescriptorSet) {
        let writes = self.batch.to_vk(set);
        unsafe { self.pool.device.device.update_descriptor_sets(&writes, &[]) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ubo(count: u32) -> BindingDesc {
        BindingDesc {
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            stage_flags: vk::ShaderStageFlags::ALL_GRAPHICS,
            count,
        }
    }

    fn sampler() -> BindingDesc {
        BindingDesc {
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            count: 1,
        }
    }

    fn ubo_cost() -> SetCost {
        let mut table = BindingTable::default();
        table.insert(0, ubo(1));
        table.set_cost()
    }

    #[test]
    fn binding_table_orders_slots() {
        let mut table = BindingTable::default();
        table.insert(2, sampler());
        table.insert(0, ubo(1));

        let bindings = table.to_vk();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].binding, 0);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[1].binding, 2);
        assert_eq!(bindings[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "already in use")]
    fn duplicate_binding_is_rejected() {
        let mut table = BindingTable::default();
        table.insert(0, ubo(1));
        table.insert(0, sampler());
    }

    #[test]
    fn single_descriptor_type_for_declared_slot() {
        let mut table = BindingTable::default();
        table.insert(1, sampler());

        assert_eq!(
            table.single_descriptor_type(1),
            Some(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        );
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "does not contain binding")]
    fn undeclared_slot_is_rejected() {
        let table = BindingTable::default();
        table.single_descriptor_type(3);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "expects 4 descriptors")]
    fn array_slot_with_single_info_is_rejected() {
        let mut table = BindingTable::default();
        table.insert(0, ubo(4));
        table.single_descriptor_type(0);
    }

    #[test]
    fn set_cost_sums_counts_per_type() {
        let mut table = BindingTable::default();
        table.insert(0, ubo(1));
        table.insert(1, ubo(2));
        table.insert(2, sampler());

        let cost = table.set_cost();
        assert_eq!(cost.per_type[&vk::DescriptorType::UNIFORM_BUFFER], 3);
        assert_eq!(cost.per_type[&vk::DescriptorType::COMBINED_IMAGE_SAMPLER], 1);
    }

    #[test]
    fn single_set_pool_refuses_second_allocation_until_reset() {
        let sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 8,
        }];
        let mut budget = PoolBudget::new(1, &sizes);
        let cost = ubo_cost();

        assert!(budget.try_reserve(&cost));
        assert!(!budget.try_reserve(&cost));
        assert_eq!(budget.sets_in_use(), 1);

        budget.reset();
        assert!(budget.try_reserve(&cost));
    }

    #[test]
    fn budget_tracks_descriptor_capacity() {
        let sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 2,
        }];
        let mut budget = PoolBudget::new(10, &sizes);
        let cost = ubo_cost();

        assert!(budget.try_reserve(&cost));
        assert!(budget.try_reserve(&cost));
        assert!(!budget.try_reserve(&cost));

        budget.release(&cost);
        assert!(budget.try_reserve(&cost));
    }

    #[test]
    fn failed_reservation_leaves_budget_untouched() {
        let sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 4,
        }];
        let mut budget = PoolBudget::new(4, &sizes);

        let mut table = BindingTable::default();
        table.insert(0, ubo(1));
        table.insert(1, sampler());
        let mixed = table.set_cost();

        // No sampler capacity at all
        assert!(!budget.try_reserve(&mixed));
        assert_eq!(budget.sets_in_use(), 0);
        for _ in 0..4 {
            assert!(budget.try_reserve(&ubo_cost()));
        }
    }

    #[test]
    fn write_batch_targets_the_given_set() {
        let mut batch = WriteBatch::default();
        let info = vk::DescriptorBufferInfo {
            buffer: vk::Buffer::null(),
            offset: 64,
            range: 16,
        };
        batch.push_buffer(0, vk::DescriptorType::UNIFORM_BUFFER, info);
        batch.push_image(
            1,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::DescriptorImageInfo::default(),
        );

        let writes = batch.to_vk(vk::DescriptorSet::null());
        assert_eq!(writes.len(), 2);

        assert_eq!(writes[0].dst_binding, 0);
        assert_eq!(writes[0].descriptor_count, 1);
        assert_eq!(writes[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        let written = unsafe { *writes[0].p_buffer_info };
        assert_eq!(written.offset, 64);
        assert_eq!(written.range, 16);

        assert_eq!(writes[1].dst_binding, 1);
        assert!(!writes[1].p_image_info.is_null());
        assert!(writes[1].p_buffer_info.is_null());
    }
}
